pub mod admin_gate;
pub mod request_id;
pub mod security_headers;

pub use admin_gate::admin_gate;
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
pub use security_headers::security_headers_middleware;
