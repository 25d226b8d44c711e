pub mod cluster_operations;
