pub mod cluster_flex;
pub mod instance_directory;
