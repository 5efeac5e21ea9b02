pub mod config;
pub mod datamap;
pub mod errors;
pub mod template;
pub mod transport;

pub use datamap::{
    DataMap, DataMapBody, DataMapConfig, DataMapInterpreter, ErrorKeys, Expression, ForeachSpec,
    InterpreterSettings, Template, Webhook,
};
pub use errors::{DataMapError, TransportError};
pub use template::{expand, expand_value, resolve_path};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
