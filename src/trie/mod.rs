pub mod node;
pub mod trie;
pub mod walk;
