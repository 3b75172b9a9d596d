//! Canonical query keys.

use anyhow::{Context, Result};
use optimist_engine::{QueryDescriptor, QuerySpec};

/// Parse a query given on the command line; bare text is read as a path
pub fn parse_query(input: &str) -> Result<QueryDescriptor> {
    let spec = match serde_json::from_str::<QuerySpec>(input) {
        Ok(spec) => spec,
        Err(_) if !input.trim_start().starts_with(['{', '"']) => QuerySpec::from(input.trim()),
        Err(err) => return Err(err).context("Failed to parse query"),
    };
    Ok(QueryDescriptor::normalize(spec)?)
}

/// `optimist key`
pub fn print_key(input: &str) -> Result<()> {
    let descriptor = parse_query(input)?;
    println!("{}", descriptor.key());
    Ok(())
}
