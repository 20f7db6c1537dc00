pub mod event_buffer;
pub mod feed;
pub mod protocol;
