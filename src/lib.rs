pub mod error;
pub mod load;
pub mod structs;
pub mod transform;

// Re-export public API
pub use error::{PipelineError, Result};
pub use load::{
    OutFormat, OutputSpec, ensure_out_dir, generate_outputs, parse_output_spec, report_generated,
    write_csv, write_excel, write_json, write_markdown, write_parquet,
};
pub use structs::{
    CellValue, Column, ColumnType, Dataset, DatasetSpec, RawConfig, RunSection, SimpleLogger, Table,
};
pub use transform::{build_table, resolve_dataset, split_line};
