//! Scheduled shorts publishing pipeline: reads a CSV of planned posts,
//! renders a short vertical video per due item from stock media and music,
//! uploads it with a future-dated release time, and tracks published items
//! in a durable posted-state file so repeated runs never publish twice.

pub mod api;
pub mod assemble;
pub mod config;
pub mod ffmpeg;
pub mod init;
pub mod publish;
pub mod runner;
pub mod schedule;
pub mod selector;
pub mod state;
