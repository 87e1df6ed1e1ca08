mod watch;

pub use watch::{traverse, watch, Flush, OnInvalidate, WatchHandle, WatchOptions, WatchSource};
