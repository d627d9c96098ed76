pub mod queue;
pub mod submit_info;
