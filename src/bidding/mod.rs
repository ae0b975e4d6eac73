pub mod assembler;
pub mod budget;
pub mod cache;
pub mod dispatcher;
pub mod dominance;
pub mod engine;
pub mod resolver;
pub mod transport;
pub mod validator;
