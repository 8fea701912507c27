//! Statement builders for SELECT / INSERT / UPDATE / DELETE.

pub mod select;
pub mod write;

use super::placeholder::{ParamContext, PlaceholderStyle};
use super::traits::SqlGenerator;
use crate::ast::{Action, Query};
use crate::error::Result;
use crate::value::Value;

/// Render `query` as a SQL statement plus its positional parameters.
pub fn build_sql(
    query: &Query,
    generator: &dyn SqlGenerator,
    style: PlaceholderStyle,
) -> Result<(String, Vec<Value>)> {
    query.validate()?;
    let mut ctx = ParamContext::new(style);
    let sql = match query.action() {
        Action::Select => select::build_select(query, generator, &mut ctx)?,
        Action::Insert => write::build_insert(query, generator, &mut ctx)?,
        Action::Update => write::build_update(query, generator, &mut ctx)?,
        Action::Delete => write::build_delete(query, generator, &mut ctx)?,
    };
    Ok((sql, ctx.into_params()))
}
