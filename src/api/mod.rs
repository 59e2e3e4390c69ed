// Serializable views of graphs and reports (graph files, JSON output).

pub mod dto;
