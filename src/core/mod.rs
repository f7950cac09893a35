pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod message;
pub mod reducer;
pub mod session;
pub mod sse;
pub mod tool_invocation;
