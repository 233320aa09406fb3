use crate::error::{PipelineError, Result};
use crate::structs::{CellValue, Column, ColumnType, Dataset, DatasetSpec, Table};
use log::debug;

/// Resolves a dataset entry against the run-level defaults.
///
/// Every field the entry leaves unset is filled from the `run` section,
/// so shared settings are written once and overridden per entry. A field
/// missing from both places is a configuration error naming the dataset
/// and the key.
///
/// # Arguments
///
/// * `id` - The dataset id (its top-level YAML key)
/// * `spec` - The dataset entry as written in YAML
/// * `defaults` - The shared fields of the `run` section
///
/// # Errors
///
/// Returns `PipelineError::Config` if:
/// - A required key is set neither on the entry nor on `run`
/// - The merged `sep` is empty
/// - The merged `header` has no columns
pub fn resolve_dataset(id: &str, spec: &DatasetSpec, defaults: &DatasetSpec) -> Result<Dataset> {
    let dataset = Dataset {
        id: id.to_string(),
        header: pick(id, "header", &spec.header, &defaults.header)?,
        sep: pick(id, "sep", &spec.sep, &defaults.sep)?,
        data: pick(id, "data", &spec.data, &defaults.data)?,
        out_path: pick(id, "out_path", &spec.out_path, &defaults.out_path)?,
        out_bname: pick(id, "out_bname", &spec.out_bname, &defaults.out_bname)?,
        out_fmts: pick(id, "out_fmts", &spec.out_fmts, &defaults.out_fmts)?,
    };

    if dataset.sep.is_empty() {
        return Err(PipelineError::Config(format!(
            "dataset [{}]: 'sep' must contain at least one delimiter character",
            id
        )));
    }
    if dataset.header.is_empty() {
        return Err(PipelineError::Config(format!(
            "dataset [{}]: 'header' must name at least one column",
            id
        )));
    }
    Ok(dataset)
}

fn pick<T: Clone>(id: &str, key: &str, own: &Option<T>, shared: &Option<T>) -> Result<T> {
    own.as_ref().or(shared.as_ref()).cloned().ok_or_else(|| {
        PipelineError::Config(format!("dataset [{}]: missing key '{}'", id, key))
    })
}

/// Splits a raw data line on any single character of `sep`, trimming
/// whitespace around every token.
pub fn split_line(line: &str, sep: &str) -> Vec<String> {
    line.split(|c: char| sep.contains(c))
        .map(|tok| tok.trim().to_string())
        .collect()
}

/// Builds the in-memory table for a resolved dataset.
///
/// Each data line is split on the dataset separator and fitted to the
/// header width: short rows are padded with null cells, cells beyond the
/// last header column are dropped. Columns are then typed by inference
/// over their tokens (see [`infer_type`]) and materialized in header
/// order.
///
/// # Returns
///
/// Returns a `Table` with one column per header entry and one row per
/// data line. An empty `data` list yields a zero-row table.
pub fn build_table(dataset: &Dataset) -> Result<Table> {
    let num_header = dataset.header.len();
    let mut rows: Vec<Vec<Option<String>>> = Vec::with_capacity(dataset.data.len());

    for line in &dataset.data {
        let mut tokens = split_line(line, &dataset.sep);
        if tokens.len() > num_header {
            debug!(
                "dataset [{}]: dropping {} cell(s) beyond the header width",
                dataset.id,
                tokens.len() - num_header
            );
            tokens.truncate(num_header);
        }
        let mut row: Vec<Option<String>> = tokens.into_iter().map(Some).collect();
        row.resize(num_header, None);
        rows.push(row);
    }

    let num_rows = rows.len();
    let columns = dataset
        .header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let raw: Vec<Option<&str>> = rows.iter().map(|row| row[i].as_deref()).collect();
            build_column(name, &raw)
        })
        .collect();

    debug!(
        "dataset [{}]: assembled table with {} column(s), {} row(s)",
        dataset.id, num_header, num_rows
    );
    Ok(Table { columns, num_rows })
}

/// Infers the narrowest column type covering every non-null token.
///
/// All tokens parse as `i64` gives Int; a mix of `i64` and `f64` gives
/// Float; anything non-numeric gives Str. A column with no tokens at all
/// (every row was padded) is Str.
fn infer_type(raw: &[Option<&str>]) -> ColumnType {
    let mut ty = ColumnType::Int;
    let mut saw_value = false;
    for token in raw.iter().flatten() {
        saw_value = true;
        if token.parse::<i64>().is_ok() {
            continue;
        }
        if token.parse::<f64>().is_ok() {
            ty = ColumnType::Float;
        } else {
            return ColumnType::Str;
        }
    }
    if saw_value { ty } else { ColumnType::Str }
}

fn build_column(name: &str, raw: &[Option<&str>]) -> Column {
    let ty = infer_type(raw);
    let cells = raw
        .iter()
        .map(|cell| match cell {
            None => CellValue::Null,
            Some(token) => typed_cell(token, ty),
        })
        .collect();
    Column {
        name: name.to_string(),
        ty,
        cells,
    }
}

fn typed_cell(token: &str, ty: ColumnType) -> CellValue {
    match ty {
        ColumnType::Int => token
            .parse::<i64>()
            .map(CellValue::Int)
            .unwrap_or_else(|_| CellValue::Str(token.to_string())),
        ColumnType::Float => token
            .parse::<f64>()
            .map(CellValue::Float)
            .unwrap_or_else(|_| CellValue::Str(token.to_string())),
        ColumnType::Str => CellValue::Str(token.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn dataset_with(header: &[&str], sep: &str, data: &[&str]) -> Dataset {
        Dataset {
            id: "test".to_string(),
            header: header.iter().map(|s| s.to_string()).collect(),
            sep: sep.to_string(),
            data: data.iter().map(|s| s.to_string()).collect(),
            out_path: PathBuf::from("."),
            out_bname: "test".to_string(),
            out_fmts: BTreeMap::new(),
        }
    }

    #[test]
    fn split_trims_whitespace_around_delimiters() {
        assert_eq!(split_line("Ika | Shallow sea | 2", "|"), ["Ika", "Shallow sea", "2"]);
    }

    #[test]
    fn split_treats_sep_as_character_set() {
        assert_eq!(split_line("a; b, c", ";,"), ["a", "b", "c"]);
    }

    #[test]
    fn short_rows_are_padded_with_nulls() {
        let table = build_table(&dataset_with(&["a", "b", "c"], "|", &["1 | 2"])).unwrap();
        assert_eq!(table.num_rows, 1);
        assert_eq!(table.columns[2].cells[0], CellValue::Null);
    }

    #[test]
    fn long_rows_are_truncated_to_header_width() {
        let table = build_table(&dataset_with(&["a"], "|", &["1 | 2 | 3"])).unwrap();
        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.columns[0].cells[0], CellValue::Int(1));
    }

    #[test]
    fn all_int_column_is_typed_int() {
        let table = build_table(&dataset_with(&["n"], "|", &["1", "-2", "+30"])).unwrap();
        assert_eq!(table.columns[0].ty, ColumnType::Int);
        assert_eq!(table.columns[0].cells[1], CellValue::Int(-2));
    }

    #[test]
    fn int_float_mix_promotes_to_float() {
        let table = build_table(&dataset_with(&["n"], "|", &["1", "2.5"])).unwrap();
        assert_eq!(table.columns[0].ty, ColumnType::Float);
        assert_eq!(table.columns[0].cells[0], CellValue::Float(1.0));
    }

    #[test]
    fn non_numeric_token_forces_str_column() {
        let table = build_table(&dataset_with(&["n"], "|", &["1", "two"])).unwrap();
        assert_eq!(table.columns[0].ty, ColumnType::Str);
        // numeric-looking cells keep their original text in a Str column
        assert_eq!(table.columns[0].cells[0], CellValue::Str("1".to_string()));
    }

    #[test]
    fn empty_token_is_an_empty_string_not_null() {
        let table = build_table(&dataset_with(&["a", "b"], "|", &["1 ||"])).unwrap();
        // "1 ||" splits to ["1", "", ""]; the third token is truncated
        assert_eq!(table.columns[1].cells[0], CellValue::Str(String::new()));
    }

    #[test]
    fn padded_only_column_is_typed_str() {
        let table = build_table(&dataset_with(&["a", "b"], "|", &["1", "2"])).unwrap();
        assert_eq!(table.columns[1].ty, ColumnType::Str);
        assert_eq!(table.columns[1].cells[0], CellValue::Null);
    }

    #[test]
    fn empty_data_yields_zero_row_table() {
        let table = build_table(&dataset_with(&["a"], "|", &[])).unwrap();
        assert_eq!(table.num_rows, 0);
        assert!(table.columns[0].cells.is_empty());
    }

    #[test]
    fn resolve_fills_missing_fields_from_run_defaults() {
        let defaults = DatasetSpec {
            header: Some(vec!["a".to_string()]),
            sep: Some("|".to_string()),
            out_path: Some(PathBuf::from("./out")),
            out_bname: Some("shared".to_string()),
            out_fmts: Some(BTreeMap::from([("csv".to_string(), "csv".to_string())])),
            ..Default::default()
        };
        let spec = DatasetSpec {
            data: Some(vec!["1".to_string()]),
            out_bname: Some("own".to_string()),
            ..Default::default()
        };
        let dataset = resolve_dataset("squid", &spec, &defaults).unwrap();
        assert_eq!(dataset.out_bname, "own"); // entry-level override wins
        assert_eq!(dataset.sep, "|");
        assert_eq!(dataset.out_path, PathBuf::from("./out"));
    }

    #[test]
    fn resolve_reports_the_missing_key() {
        let defaults = DatasetSpec {
            header: Some(vec!["a".to_string()]),
            sep: Some("|".to_string()),
            ..Default::default()
        };
        let spec = DatasetSpec {
            data: Some(vec![]),
            ..Default::default()
        };
        let err = resolve_dataset("squid", &spec, &defaults).unwrap_err();
        assert!(err.to_string().contains("missing key 'out_path'"));
    }

    #[test]
    fn resolve_rejects_empty_separator() {
        let defaults = DatasetSpec {
            header: Some(vec!["a".to_string()]),
            sep: Some(String::new()),
            data: Some(vec![]),
            out_path: Some(PathBuf::from(".")),
            out_bname: Some("x".to_string()),
            out_fmts: Some(BTreeMap::new()),
            ..Default::default()
        };
        let err = resolve_dataset("squid", &DatasetSpec::default(), &defaults).unwrap_err();
        assert!(err.to_string().contains("sep"));
    }
}
