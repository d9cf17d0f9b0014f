pub mod file_lock;
pub mod grow_policy;
pub mod head;
pub mod layout;
pub mod part;
