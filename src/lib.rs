pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod rules;
pub mod serialization;
pub mod stream;
pub mod utils;
pub mod validator;
pub mod vocabulary;
pub mod writer;
pub mod api;

pub use api::{analyze, analyze_json, AnalysisResult};
