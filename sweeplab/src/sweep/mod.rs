// src/sweep/mod.rs
//
// Parameter sweep planning.
//
// - ConfigurationTemplate: ordered Fixed/Swept fields, optionally nested
// - expand / nth / count: deterministic cartesian expansion with stable
//   experiment indices
// - table: the configuration file (CSV), written once per batch and read
//   back one row at a time by experiment_index

pub mod expand;
pub mod table;
pub mod template;

pub use expand::{count, expand, nth, ConcreteConfiguration};
pub use table::{
    read_configuration, read_configuration_file, table_fingerprint, write_configuration_file,
    write_configuration_table,
};
pub use template::{
    ConfigurationTemplate, FieldKind, Param, ParamValue, TemplateField, EXPERIMENT_INDEX,
    PATH_SEPARATOR,
};
