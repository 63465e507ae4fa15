pub mod pexels;
pub mod youtube;
