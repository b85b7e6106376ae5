pub mod index;
pub mod span;
pub mod word;

pub use index::{TextIndex, WordIndexer, WordSpan};
pub use span::{EntitySet, EntitySpan};
pub use word::Word;
