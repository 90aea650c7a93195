pub mod markup;
pub mod prompt;
pub mod session;
pub mod transport;

pub use prompt::{ConsolePrompter, Prompter};
pub use session::Session;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, RequestBody, Transport};
