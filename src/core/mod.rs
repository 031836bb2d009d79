//! 核心层：致命错误、会话目录、运行监管、文本工具

pub mod error;
pub mod session;
pub mod session_supervisor;
pub mod text;

pub use error::ForgeError;
pub use session::{sanitize_relative, write_atomic, Session};
pub use session_supervisor::SessionSupervisor;
