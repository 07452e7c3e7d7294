pub mod base;
pub mod lark;

pub use base::ChatTransport;
pub use lark::LarkClient;
