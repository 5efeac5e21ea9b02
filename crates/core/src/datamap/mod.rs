pub mod builder;
pub mod interpreter;
pub mod model;

pub use builder::DataMap;
pub use interpreter::{DataMapInterpreter, InterpreterSettings, ALL_WEBHOOKS_FAILED};
pub use model::{DataMapBody, DataMapConfig, ErrorKeys, Expression, ForeachSpec, Template, Webhook};
