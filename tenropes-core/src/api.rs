pub mod live;
pub mod rest;

pub use live::{LiveStream, LiveTransport, SocketTransport};
pub use rest::{ChatApi, RestClient};

pub const DEFAULT_BASE_URL: &str = "https://edu.tardigrade.land/msg";
