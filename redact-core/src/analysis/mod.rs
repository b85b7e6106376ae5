pub mod bbox;
pub mod fusion;
pub mod labels;
pub mod mapper;
pub mod region;
