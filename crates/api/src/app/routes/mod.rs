pub mod bridge;
pub mod internal;
pub mod system;
