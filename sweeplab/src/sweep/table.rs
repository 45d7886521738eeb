// src/sweep/table.rs
//
// Configuration file: one CSV row per concrete configuration, with the
// `experiment_index` column last. Consumers select exactly one row by exact
// integer match on that column.
//
// Output is byte-identical when regenerated from an unchanged template.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use super::expand::ConcreteConfiguration;
use super::template::{ParamValue, EXPERIMENT_INDEX};
use crate::error::SweepError;

/// Write the configuration table to any writer.
///
/// All configurations must share the same columns (true for any single
/// expansion). An empty slice writes nothing.
pub fn write_configuration_table<W: Write>(
    writer: W,
    configs: &[ConcreteConfiguration],
) -> Result<(), SweepError> {
    let first = match configs.first() {
        Some(c) => c,
        None => return Ok(()),
    };

    let mut header: Vec<&str> = first.columns().collect();
    header.push(EXPERIMENT_INDEX);

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&header)?;

    for config in configs {
        if !config.columns().eq(first.columns()) {
            return Err(SweepError::config(
                EXPERIMENT_INDEX,
                format!(
                    "configuration {} has different columns than configuration {}",
                    config.experiment_index(),
                    first.experiment_index()
                ),
            ));
        }
        let mut row: Vec<String> = config.values().iter().map(|(_, v)| v.to_string()).collect();
        row.push(config.experiment_index().to_string());
        csv_writer.write_record(&row)?;
    }

    csv_writer.flush().map_err(|e| SweepError::Io {
        path: "<configuration table>".to_string(),
        source: e,
    })?;
    Ok(())
}

/// Write the configuration table to `path` (truncating).
pub fn write_configuration_file<P: AsRef<Path>>(
    path: P,
    configs: &[ConcreteConfiguration],
) -> Result<(), SweepError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SweepError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    write_configuration_table(file, configs)
}

/// Read the configuration with `experiment_index == index` from any reader.
///
/// The first matching row wins. Cells are typed back by inference
/// (integer, float, boolean, text).
pub fn read_configuration<R: Read>(
    reader: R,
    index: usize,
) -> Result<Option<ConcreteConfiguration>, SweepError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let index_column = headers
        .iter()
        .position(|h| h == EXPERIMENT_INDEX)
        .ok_or_else(|| SweepError::config(EXPERIMENT_INDEX, "column missing from table header"))?;

    for record in csv_reader.records() {
        let record = record?;
        let cell = record.get(index_column).unwrap_or_default();
        if cell.trim().parse::<usize>().ok() != Some(index) {
            continue;
        }

        let values = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(i, _)| *i != index_column)
            .map(|(_, (name, cell))| (name.to_string(), ParamValue::infer(cell)))
            .collect();
        return Ok(Some(ConcreteConfiguration::new(index, values)));
    }

    Ok(None)
}

/// Read the configuration with `experiment_index == index` from `path`.
pub fn read_configuration_file<P: AsRef<Path>>(
    path: P,
    index: usize,
) -> Result<ConcreteConfiguration, SweepError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SweepError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    read_configuration(file, index)?.ok_or_else(|| SweepError::IndexNotFound {
        path: path.display().to_string(),
        index,
    })
}

/// SHA-256 of the serialized table, hex-encoded.
///
/// Stored next to the configuration file so a regeneration can be checked
/// for byte-identical output.
pub fn table_fingerprint(configs: &[ConcreteConfiguration]) -> Result<String, SweepError> {
    let mut buf = Vec::new();
    write_configuration_table(&mut buf, configs)?;
    let hash = Sha256::digest(&buf);
    Ok(hash.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::expand::expand;
    use crate::sweep::template::ConfigurationTemplate;

    fn sample_configs() -> Vec<ConcreteConfiguration> {
        let template = ConfigurationTemplate::new("t")
            .swept("policy", ["LRURP", "LFURP"])
            .swept("seed", [1, 4])
            .fixed("clock", 3.0);
        expand(&template).unwrap()
    }

    #[test]
    fn test_header_has_index_last() {
        let mut buf = Vec::new();
        write_configuration_table(&mut buf, &sample_configs()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("policy,seed,clock,experiment_index"));
        assert_eq!(lines.next(), Some("LRURP,1,3.0,0"));
        assert_eq!(lines.last(), Some("LFURP,4,3.0,3"));
    }

    #[test]
    fn test_read_selects_exact_index() {
        let configs = sample_configs();
        let mut buf = Vec::new();
        write_configuration_table(&mut buf, &configs).unwrap();

        let row = read_configuration(buf.as_slice(), 2).unwrap().expect("row 2");
        assert_eq!(row, configs[2]);
        assert!(read_configuration(buf.as_slice(), 9).unwrap().is_none());
    }

    #[test]
    fn test_missing_index_column_is_error() {
        let table = "a,b\n1,2\n";
        assert!(read_configuration(table.as_bytes(), 0).is_err());
    }

    #[test]
    fn test_fingerprint_stable() {
        let a = table_fingerprint(&sample_configs()).unwrap();
        let b = table_fingerprint(&sample_configs()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
