#![allow(clippy::cast_precision_loss)]

mod support;

mod checkpointing;
mod error_handling;
mod pause_resume;
