//! Line-oriented descriptor records
//!
//! ```text
//! # comment
//! [app::Impl]
//! contract=app::Foo
//! scope=Singleton
//! name=primary
//! qualifier=Blue
//! type=CLASS
//! rank=5
//! visibility=NORMAL
//! metadata=runLevel=2
//! ```
//!
//! A record starts with a bracketed header naming the implementation; an
//! `implementation=` line overrides it. Repeated keys accumulate.

use std::io::{BufRead, Write};

use crate::container::descriptor::{Descriptor, DescriptorBuilder, DescriptorType, DescriptorVisibility};
use crate::errors::CoreError;

fn parse_error(line: usize, message: impl Into<String>) -> CoreError {
    CoreError::Parse {
        line,
        message: message.into(),
    }
}

struct Record {
    header: String,
    lines: Vec<(usize, String, String)>,
}

impl Record {
    fn build(self) -> Result<Descriptor, CoreError> {
        let implementation = self
            .lines
            .iter()
            .rev()
            .find(|(_, key, _)| key == "implementation")
            .map(|(_, _, value)| value.clone())
            .unwrap_or(self.header);
        let mut builder = DescriptorBuilder::new(implementation);

        for (line, key, value) in self.lines {
            builder = match key.as_str() {
                "implementation" => builder,
                "contract" => builder.to(value),
                "scope" => builder.in_scope(value),
                "name" => builder.named(value),
                "qualifier" => builder.qualified_by(value),
                "type" => builder.of_type(
                    value
                        .parse::<DescriptorType>()
                        .map_err(|e| parse_error(line, e.to_string()))?,
                ),
                "visibility" => builder.with_visibility(
                    value
                        .parse::<DescriptorVisibility>()
                        .map_err(|e| parse_error(line, e.to_string()))?,
                ),
                "rank" => builder.of_rank(
                    value
                        .parse::<i32>()
                        .map_err(|_| parse_error(line, format!("rank '{}' is not an integer", value)))?,
                ),
                "metadata" => {
                    let (meta_key, meta_value) = value
                        .split_once('=')
                        .ok_or_else(|| parse_error(line, "metadata must be written as key=value"))?;
                    builder.has(meta_key.trim(), meta_value.trim())
                }
                other => return Err(parse_error(line, format!("unknown key '{}'", other))),
            };
        }
        Ok(builder.build())
    }
}

/// Read every descriptor record from a reader
pub fn read_descriptors(reader: impl BufRead) -> Result<Vec<Descriptor>, CoreError> {
    let mut descriptors = Vec::new();
    let mut current: Option<Record> = None;

    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let header = header
                .strip_suffix(']')
                .ok_or_else(|| parse_error(number, "unterminated record header"))?
                .trim();
            if header.is_empty() {
                return Err(parse_error(number, "empty record header"));
            }
            if let Some(record) = current.take() {
                descriptors.push(record.build()?);
            }
            current = Some(Record {
                header: header.to_string(),
                lines: Vec::new(),
            });
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| parse_error(number, "expected key=value"))?;
        let record = current
            .as_mut()
            .ok_or_else(|| parse_error(number, "key=value outside of a record"))?;
        record
            .lines
            .push((number, key.trim().to_string(), value.trim().to_string()));
    }

    if let Some(record) = current.take() {
        descriptors.push(record.build()?);
    }
    Ok(descriptors)
}

/// Write descriptors as records
pub fn write_descriptors<'a>(
    descriptors: impl IntoIterator<Item = &'a Descriptor>,
    mut writer: impl Write,
) -> Result<(), CoreError> {
    for descriptor in descriptors {
        writeln!(writer, "[{}]", descriptor.implementation())?;
        for contract in descriptor.contracts() {
            writeln!(writer, "contract={}", contract)?;
        }
        if let Some(scope) = descriptor.scope() {
            writeln!(writer, "scope={}", scope)?;
        }
        if let Some(name) = descriptor.name() {
            writeln!(writer, "name={}", name)?;
        }
        for qualifier in descriptor.qualifiers() {
            writeln!(writer, "qualifier={}", qualifier)?;
        }
        writeln!(writer, "type={}", descriptor.descriptor_type())?;
        writeln!(writer, "rank={}", descriptor.rank())?;
        writeln!(writer, "visibility={}", descriptor.visibility().as_str())?;
        for (key, values) in descriptor.metadata() {
            for value in values {
                writeln!(writer, "metadata={}={}", key, value)?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}
