pub mod anthropic;
mod http_errors;
