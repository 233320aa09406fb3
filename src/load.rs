use crate::error::{PipelineError, Result};
use crate::structs::{CellValue, Column, ColumnType, Dataset, Table};
use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use csv::WriterBuilder;
use log::{debug, warn};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use rust_xlsxwriter::{Format, FormatBorder, Workbook};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Separator between the file extension and keyword arguments in an
/// `out_fmts` value, and between individual keyword arguments.
const SEP_EXT_KWARGS: char = ';';
/// Separator between a keyword argument key and its value.
const SEP_KEY_VAL: char = '=';

/// Output formats selectable from the `out_fmts` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutFormat {
    Csv,
    Excel,
    Markdown,
    Json,
    Parquet,
}

impl FromStr for OutFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(OutFormat::Csv),
            "excel" => Ok(OutFormat::Excel),
            "markdown" => Ok(OutFormat::Markdown),
            "json" => Ok(OutFormat::Json),
            "parquet" => Ok(OutFormat::Parquet),
            other => Err(PipelineError::Config(format!(
                "unknown output format '{}' (expected csv, excel, markdown, json or parquet)",
                other
            ))),
        }
    }
}

/// A parsed `out_fmts` value: `<ext>[; key=val]...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub ext: String,
    pub kwargs: BTreeMap<String, String>,
}

/// Parses the compact format string of an `out_fmts` entry.
///
/// The first `;`-separated token is the file extension, every further
/// token is a `key=val` keyword argument. Whitespace around tokens,
/// keys and values is ignored.
///
/// # Errors
///
/// Returns `PipelineError::Config` if the extension is empty or a
/// keyword token has no `=` or an empty key.
pub fn parse_output_spec(raw: &str) -> Result<OutputSpec> {
    let mut parts = raw.split(SEP_EXT_KWARGS).map(str::trim);
    let ext = parts.next().unwrap_or_default().to_string();
    if ext.is_empty() {
        return Err(PipelineError::Config(format!(
            "output spec '{}' is missing a file extension",
            raw
        )));
    }
    let mut kwargs = BTreeMap::new();
    for part in parts.filter(|p| !p.is_empty()) {
        let Some((key, val)) = part.split_once(SEP_KEY_VAL) else {
            return Err(PipelineError::Config(format!(
                "malformed keyword argument '{}' in output spec '{}'",
                part, raw
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(PipelineError::Config(format!(
                "empty keyword argument key in output spec '{}'",
                raw
            )));
        }
        kwargs.insert(key.to_string(), val.trim().to_string());
    }
    Ok(OutputSpec { ext, kwargs })
}

fn reject_unknown_kwargs(
    format: &str,
    kwargs: &BTreeMap<String, String>,
    allowed: &[&str],
) -> Result<()> {
    for key in kwargs.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(PipelineError::Config(format!(
                "format '{}' does not accept keyword '{}'",
                format, key
            )));
        }
    }
    Ok(())
}

fn parse_bool_kwarg(key: &str, val: &str) -> Result<bool> {
    match val {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(PipelineError::Config(format!(
            "keyword '{}' expects true or false, got '{}'",
            key, other
        ))),
    }
}

/// Reports a generated file or directory, name in square brackets.
pub fn report_generated(name: &str) {
    println!("[{}] generated.", name);
}

/// Makes sure the output directory exists, asking on stdin before
/// creating it. `assume_yes` answers the prompt affirmatively without
/// asking. Returns false if the user declined.
pub fn ensure_out_dir(path: &Path, assume_yes: bool) -> Result<bool> {
    if path.exists() {
        return Ok(true);
    }
    if !assume_yes {
        print!("Create output directory [{}]? (y/n) ", path.display());
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            return Ok(false);
        }
    }
    fs::create_dir_all(path)?;
    report_generated(&path.display().to_string());
    Ok(true)
}

/// Writes every output format requested by one dataset.
///
/// Derives each filename as `<out_path>/<out_bname>.<ext>` and invokes
/// the matching writer. Returns the paths written; an empty Vec means
/// the output directory was missing and the user declined to create it.
///
/// # Errors
///
/// Returns `PipelineError` if a format name, output spec or keyword
/// argument is invalid, or if a writer fails.
pub fn generate_outputs(dataset: &Dataset, table: &Table, assume_yes: bool) -> Result<Vec<PathBuf>> {
    if !ensure_out_dir(&dataset.out_path, assume_yes)? {
        warn!(
            "dataset [{}]: output directory [{}] not created, skipping its outputs",
            dataset.id,
            dataset.out_path.display()
        );
        return Ok(Vec::new());
    }

    let mut written = Vec::with_capacity(dataset.out_fmts.len());
    for (fmt_name, raw_spec) in &dataset.out_fmts {
        let format: OutFormat = fmt_name.parse()?;
        let spec = parse_output_spec(raw_spec)?;
        let output_path = dataset
            .out_path
            .join(format!("{}.{}", dataset.out_bname, spec.ext));
        debug!(
            "dataset [{}]: writing {:?} output to [{}]",
            dataset.id,
            format,
            output_path.display()
        );
        match format {
            OutFormat::Csv => write_csv(table, &output_path, &spec.kwargs)?,
            OutFormat::Excel => write_excel(table, &output_path, &spec.kwargs)?,
            OutFormat::Markdown => write_markdown(table, &output_path, &spec.kwargs)?,
            OutFormat::Json => write_json(table, &output_path, &spec.kwargs)?,
            OutFormat::Parquet => write_parquet(table, &output_path, &spec.kwargs)?,
        }
        report_generated(&output_path.display().to_string());
        written.push(output_path);
    }
    Ok(written)
}

/// Writes the table to a CSV file.
///
/// Keywords: `sep` (single-byte field delimiter, default `,`; write
/// `\t` for a tab, a literal tab would be trimmed away with the token
/// whitespace) and `header` (`true`/`false`, write the header record,
/// default true). Null cells render as empty fields.
pub fn write_csv(table: &Table, output_path: &Path, kwargs: &BTreeMap<String, String>) -> Result<()> {
    reject_unknown_kwargs("csv", kwargs, &["sep", "header"])?;
    let delimiter = match kwargs.get("sep").map(String::as_str) {
        None => b',',
        Some("\\t") => b'\t',
        Some(s) if s.len() == 1 => s.as_bytes()[0],
        Some(s) => {
            return Err(PipelineError::Config(format!(
                "csv keyword 'sep' expects a single character, got '{}'",
                s
            )));
        }
    };
    let write_header = match kwargs.get("header") {
        Some(val) => parse_bool_kwarg("header", val)?,
        None => true,
    };

    let file = File::create(output_path)?;
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_writer(file);
    if write_header {
        writer.write_record(table.columns.iter().map(|c| c.name.as_str()))?;
    }
    for row in 0..table.num_rows {
        writer.write_record(table.columns.iter().map(|c| c.cells[row].render()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the table as a JSON array of row objects, columns in header
/// order. Keyword: `pretty` (`true`/`false`, default true).
pub fn write_json(table: &Table, output_path: &Path, kwargs: &BTreeMap<String, String>) -> Result<()> {
    reject_unknown_kwargs("json", kwargs, &["pretty"])?;
    let pretty = match kwargs.get("pretty") {
        Some(val) => parse_bool_kwarg("pretty", val)?,
        None => true,
    };

    let mut records = Vec::with_capacity(table.num_rows);
    for row in 0..table.num_rows {
        let mut object = serde_json::Map::new();
        for column in &table.columns {
            object.insert(column.name.clone(), json_value(&column.cells[row]));
        }
        records.push(serde_json::Value::Object(object));
    }

    let file = File::create(output_path)?;
    if pretty {
        serde_json::to_writer_pretty(file, &records)?;
    } else {
        serde_json::to_writer(file, &records)?;
    }
    Ok(())
}

fn json_value(cell: &CellValue) -> serde_json::Value {
    match cell {
        CellValue::Int(v) => serde_json::Value::from(*v),
        // non-finite floats have no JSON representation
        CellValue::Float(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        CellValue::Str(s) => serde_json::Value::String(s.clone()),
        CellValue::Null => serde_json::Value::Null,
    }
}

/// Writes the table as a Markdown pipe table.
///
/// Cells are padded to column width; numeric columns are right-aligned
/// via `---:` separators. Keyword: `encoding`, accepted only as a UTF-8
/// spelling since Rust output is always UTF-8.
pub fn write_markdown(
    table: &Table,
    output_path: &Path,
    kwargs: &BTreeMap<String, String>,
) -> Result<()> {
    reject_unknown_kwargs("markdown", kwargs, &["encoding"])?;
    if let Some(encoding) = kwargs.get("encoding") {
        if !matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
            return Err(PipelineError::Config(format!(
                "markdown output is always UTF-8, got encoding '{}'",
                encoding
            )));
        }
    }

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    render_markdown(table, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn render_markdown<W: Write>(table: &Table, out: &mut W) -> io::Result<()> {
    let rendered: Vec<Vec<String>> = table
        .columns
        .iter()
        .map(|c| c.cells.iter().map(CellValue::render).collect())
        .collect();
    let widths: Vec<usize> = table
        .columns
        .iter()
        .zip(&rendered)
        .map(|(column, cells)| {
            cells
                .iter()
                .map(|s| s.chars().count())
                .chain([column.name.chars().count(), 3])
                .max()
                .unwrap_or(3)
        })
        .collect();

    let header: Vec<String> = table
        .columns
        .iter()
        .zip(&widths)
        .map(|(column, &width)| pad_cell(&column.name, width, column.ty.is_numeric()))
        .collect();
    writeln!(out, "| {} |", header.join(" | "))?;

    let separator: Vec<String> = table
        .columns
        .iter()
        .zip(&widths)
        .map(|(column, &width)| {
            if column.ty.is_numeric() {
                format!("{}:", "-".repeat(width.saturating_sub(1)))
            } else {
                "-".repeat(width)
            }
        })
        .collect();
    writeln!(out, "| {} |", separator.join(" | "))?;

    for row in 0..table.num_rows {
        let cells: Vec<String> = table
            .columns
            .iter()
            .zip(&rendered)
            .zip(&widths)
            .map(|((column, cells), &width)| pad_cell(&cells[row], width, column.ty.is_numeric()))
            .collect();
        writeln!(out, "| {} |", cells.join(" | "))?;
    }
    Ok(())
}

fn pad_cell(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.chars().count()));
    if right_align {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

/// Writes the table to an Excel workbook with a styled header row.
///
/// The header row is bold with a thin bottom border; numbers are
/// written as numbers. Keywords: `sheet_name` (worksheet name) and
/// `autofit` (`true`/`false`, fit column widths, default true).
pub fn write_excel(
    table: &Table,
    output_path: &Path,
    kwargs: &BTreeMap<String, String>,
) -> Result<()> {
    reject_unknown_kwargs("excel", kwargs, &["sheet_name", "autofit"])?;
    let autofit = match kwargs.get("autofit") {
        Some(val) => parse_bool_kwarg("autofit", val)?,
        None => true,
    };

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    if let Some(name) = kwargs.get("sheet_name") {
        worksheet.set_name(name)?;
    }

    let header_format = Format::new()
        .set_bold()
        .set_border_bottom(FormatBorder::Thin);
    for (col, column) in table.columns.iter().enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, column.name.as_str(), &header_format)?;
        for (row, cell) in column.cells.iter().enumerate() {
            let row = row as u32 + 1;
            match cell {
                CellValue::Int(v) => {
                    worksheet.write_number(row, col, *v as f64)?;
                }
                CellValue::Float(v) => {
                    worksheet.write_number(row, col, *v)?;
                }
                CellValue::Str(s) => {
                    worksheet.write_string(row, col, s.as_str())?;
                }
                CellValue::Null => {}
            }
        }
    }
    if autofit {
        worksheet.autofit();
    }

    workbook.save(output_path)?;
    Ok(())
}

/// Writes the table to a columnar Parquet file using Arrow format.
///
/// The schema is derived from the inferred column types (Int64,
/// Float64, Utf8; all nullable). Accepts no keywords.
pub fn write_parquet(
    table: &Table,
    output_path: &Path,
    kwargs: &BTreeMap<String, String>,
) -> Result<()> {
    reject_unknown_kwargs("parquet", kwargs, &[])?;

    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|column| Field::new(&column.name, arrow_type(column.ty), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let arrays: Vec<ArrayRef> = table.columns.iter().map(column_array).collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Int => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Str => DataType::Utf8,
    }
}

fn column_array(column: &Column) -> ArrayRef {
    match column.ty {
        ColumnType::Int => Arc::new(
            column
                .cells
                .iter()
                .map(|cell| match cell {
                    CellValue::Int(v) => Some(*v),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        ColumnType::Float => Arc::new(
            column
                .cells
                .iter()
                .map(|cell| match cell {
                    CellValue::Float(v) => Some(*v),
                    CellValue::Int(v) => Some(*v as f64),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        ColumnType::Str => Arc::new(
            column
                .cells
                .iter()
                .map(|cell| match cell {
                    CellValue::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect::<StringArray>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(columns: Vec<Column>) -> Table {
        let num_rows = columns.first().map(|c| c.cells.len()).unwrap_or(0);
        Table { columns, num_rows }
    }

    #[test]
    fn output_spec_with_extension_only() {
        let spec = parse_output_spec("csv").unwrap();
        assert_eq!(spec.ext, "csv");
        assert!(spec.kwargs.is_empty());
    }

    #[test]
    fn output_spec_splits_and_trims_kwargs() {
        let spec = parse_output_spec("xlsx; sheet_name = Creatures ; autofit=false").unwrap();
        assert_eq!(spec.ext, "xlsx");
        assert_eq!(spec.kwargs.get("sheet_name").map(String::as_str), Some("Creatures"));
        assert_eq!(spec.kwargs.get("autofit").map(String::as_str), Some("false"));
    }

    #[test]
    fn output_spec_rejects_kwarg_without_separator() {
        let err = parse_output_spec("csv; header").unwrap_err();
        assert!(err.to_string().contains("malformed keyword argument"));
    }

    #[test]
    fn output_spec_rejects_empty_extension() {
        assert!(parse_output_spec("  ; a=b").is_err());
    }

    #[test]
    fn unknown_format_name_is_a_config_error() {
        let err = "latex".parse::<OutFormat>().unwrap_err();
        assert!(err.to_string().contains("unknown output format"));
    }

    #[test]
    fn unknown_kwarg_is_rejected() {
        let kwargs = BTreeMap::from([("index".to_string(), "false".to_string())]);
        assert!(write_csv(&table_of(vec![]), Path::new("/dev/null"), &kwargs).is_err());
    }

    #[test]
    fn bool_kwarg_rejects_other_spellings() {
        assert!(parse_bool_kwarg("header", "yes").is_err());
        assert!(!parse_bool_kwarg("header", "false").unwrap());
    }

    #[test]
    fn markdown_pads_and_right_aligns_numeric_columns() {
        let table = table_of(vec![
            Column {
                name: "Name".to_string(),
                ty: ColumnType::Str,
                cells: vec![
                    CellValue::Str("Ika".to_string()),
                    CellValue::Str("Tako".to_string()),
                ],
            },
            Column {
                name: "Age".to_string(),
                ty: ColumnType::Int,
                cells: vec![CellValue::Int(2), CellValue::Null],
            },
        ]);
        let mut out = Vec::new();
        render_markdown(&table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = "\
| Name | Age |
| ---- | --: |
| Ika  |   2 |
| Tako |     |
";
        assert_eq!(text, expected);
    }

    #[test]
    fn json_value_maps_nulls_and_non_finite_floats() {
        assert_eq!(json_value(&CellValue::Null), serde_json::Value::Null);
        assert_eq!(json_value(&CellValue::Float(f64::NAN)), serde_json::Value::Null);
        assert_eq!(json_value(&CellValue::Int(7)), serde_json::Value::from(7));
    }

    #[test]
    fn parquet_column_arrays_carry_nulls() {
        use arrow_array::Array;
        let column = Column {
            name: "n".to_string(),
            ty: ColumnType::Int,
            cells: vec![CellValue::Int(1), CellValue::Null],
        };
        let array = column_array(&column);
        assert_eq!(array.len(), 2);
        assert!(array.is_null(1));
    }
}
