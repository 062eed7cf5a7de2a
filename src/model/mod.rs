pub mod remote_file;
pub mod task;
