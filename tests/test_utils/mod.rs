#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod scripted_connector;
pub mod shared_buffer;

pub use fixtures::{captured_fallback, wait_until};
pub use scripted_connector::{Event, Script, ScriptedConnector};
pub use shared_buffer::SharedBuf;
