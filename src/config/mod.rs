mod settings;

pub use settings::{
    JwtConfig, LogConfig, LogFormat, ServerConfig, Settings, ShutdownSettings, WebSocketConfig,
};
