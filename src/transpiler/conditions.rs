//! Predicate rendering for SQL generators.

use super::placeholder::ParamContext;
use super::traits::{SqlFeature, SqlGenerator, escape_identifier};
use crate::ast::Predicate;
use crate::error::{OnedbError, Result};

/// Fail with `UnsupportedOperation` unless `generator` can express `feature`.
pub fn require(generator: &dyn SqlGenerator, feature: SqlFeature) -> Result<()> {
    if generator.supports(feature) {
        Ok(())
    } else {
        Err(OnedbError::unsupported(feature.clause(), generator.name()))
    }
}

/// Render a predicate tree.
///
/// The outermost combinator is written bare; every nested combinator is
/// wrapped in parentheses, so the output never depends on AND/OR precedence.
pub fn render_predicate(
    predicate: &Predicate,
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
) -> Result<String> {
    render(predicate, generator, ctx, false)
}

fn render(
    predicate: &Predicate,
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
    nested: bool,
) -> Result<String> {
    match predicate {
        Predicate::Compare { column, op, value } => Ok(format!(
            "{} {} {}",
            escape_identifier(generator, column),
            op.sql_symbol(),
            ctx.add_param(value.clone())
        )),
        Predicate::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                // Nothing is IN an empty set; everything is NOT IN it.
                return Ok(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
            }
            if *negated {
                require(generator, SqlFeature::Not)?;
            }
            let placeholders: Vec<String> =
                values.iter().map(|v| ctx.add_param(v.clone())).collect();
            Ok(format!(
                "{} {} ({})",
                escape_identifier(generator, column),
                if *negated { "NOT IN" } else { "IN" },
                placeholders.join(", ")
            ))
        }
        Predicate::Between {
            column,
            low,
            high,
            negated,
        } => {
            let col = escape_identifier(generator, column);
            if !generator.supports(SqlFeature::Between) {
                // Range form for dialects without BETWEEN.
                if *negated {
                    return Err(OnedbError::unsupported("NOT BETWEEN", generator.name()));
                }
                let lo = ctx.add_param(low.clone());
                let hi = ctx.add_param(high.clone());
                let sql = format!("{col} >= {lo} AND {col} <= {hi}");
                return Ok(if nested { format!("({})", sql) } else { sql });
            }
            let lo = ctx.add_param(low.clone());
            let hi = ctx.add_param(high.clone());
            Ok(format!(
                "{} {}BETWEEN {} AND {}",
                col,
                if *negated { "NOT " } else { "" },
                lo,
                hi
            ))
        }
        Predicate::Null { column, negated } => {
            require(generator, SqlFeature::NullCheck)?;
            Ok(format!(
                "{} IS {}NULL",
                escape_identifier(generator, column),
                if *negated { "NOT " } else { "" }
            ))
        }
        Predicate::Like {
            column,
            pattern,
            case_insensitive,
            negated,
        } => {
            require(generator, SqlFeature::Like)?;
            let col = escape_identifier(generator, column);
            let not = if *negated { "NOT " } else { "" };
            let ph = ctx.add_param(pattern.clone().into());
            if *case_insensitive {
                if generator.supports_ilike() {
                    Ok(format!("{} {}ILIKE {}", col, not, ph))
                } else {
                    Ok(format!("LOWER({}) {}LIKE LOWER({})", col, not, ph))
                }
            } else {
                Ok(format!("{} {}LIKE {}", col, not, ph))
            }
        }
        Predicate::And(children) => render_group(children, " AND ", generator, ctx, nested),
        Predicate::Or(children) => {
            require(generator, SqlFeature::Or)?;
            render_group(children, " OR ", generator, ctx, nested)
        }
        Predicate::Not(inner) => {
            require(generator, SqlFeature::Not)?;
            Ok(format!("NOT ({})", render(inner, generator, ctx, false)?))
        }
    }
}

fn render_group(
    children: &[Predicate],
    joiner: &str,
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
    nested: bool,
) -> Result<String> {
    if children.len() == 1 {
        return render(&children[0], generator, ctx, nested);
    }
    let parts = children
        .iter()
        .map(|child| render(child, generator, ctx, true))
        .collect::<Result<Vec<_>>>()?;
    let sql = parts.join(joiner);
    Ok(if nested { format!("({})", sql) } else { sql })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::placeholder::PlaceholderStyle;
    use crate::transpiler::sql::ansi::AnsiGenerator;
    use crate::transpiler::sql::cql::CqlGenerator;
    use crate::transpiler::sql::postgres::PostgresGenerator;
    use pretty_assertions::assert_eq;

    fn render_ansi(p: &Predicate) -> String {
        let mut ctx = ParamContext::new(PlaceholderStyle::Question);
        render_predicate(p, &AnsiGenerator, &mut ctx).unwrap()
    }

    #[test]
    fn test_nested_groups_are_parenthesized() {
        let p = Predicate::eq("a", 1)
            .or(Predicate::eq("b", 2))
            .and(Predicate::eq("c", 3));
        assert_eq!(render_ansi(&p), "(a = ? OR b = ?) AND c = ?");

        let p = Predicate::eq("a", 1)
            .and(Predicate::eq("b", 2))
            .or(Predicate::eq("c", 3).and(Predicate::eq("d", 4)));
        assert_eq!(render_ansi(&p), "(a = ? AND b = ?) OR (c = ? AND d = ?)");
    }

    #[test]
    fn test_not_and_empty_in() {
        let p = Predicate::is_null("deleted_at").not();
        assert_eq!(render_ansi(&p), "NOT (deleted_at IS NULL)");
        let empty: Vec<i64> = vec![];
        assert_eq!(render_ansi(&Predicate::in_list("id", empty.clone())), "1 = 0");
        assert_eq!(render_ansi(&Predicate::not_in("id", empty)), "1 = 1");
    }

    #[test]
    fn test_reserved_column_is_quoted() {
        assert_eq!(render_ansi(&Predicate::eq("order", 1)), "\"order\" = ?");
    }

    #[test]
    fn test_ilike_per_dialect() {
        let p = Predicate::ilike("name", "j%");
        let mut ctx = ParamContext::new(PlaceholderStyle::Dollar);
        assert_eq!(
            render_predicate(&p, &PostgresGenerator, &mut ctx).unwrap(),
            "name ILIKE $1"
        );
        assert_eq!(render_ansi(&p), "LOWER(name) LIKE LOWER(?)");
    }

    #[test]
    fn test_cql_rejects_or() {
        let p = Predicate::eq("a", 1).or(Predicate::eq("b", 2));
        let mut ctx = ParamContext::new(PlaceholderStyle::Question);
        let err = render_predicate(&p, &CqlGenerator::default(), &mut ctx).unwrap_err();
        assert_eq!(err.details()["clause"], "OR");

        let between = Predicate::between("ts", 1, 5);
        let mut ctx = ParamContext::new(PlaceholderStyle::Question);
        assert_eq!(
            render_predicate(&between, &CqlGenerator::default(), &mut ctx).unwrap(),
            "ts >= ? AND ts <= ?"
        );
    }
}
