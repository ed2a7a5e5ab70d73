//! Instruction parser: turns a dashboard item's free-text prompt into a
//! structured [`ChartConfig`].
//!
//! The parser is a total function. It runs a fixed, ordered set of
//! independent matchers over the prompt; each matcher either produces a
//! patch for one configuration field or leaves that field at its default.
//! Malformed or partially-matching text degrades per-field to the default,
//! so every input, including an empty string, yields a usable
//! configuration.

use crate::model::{ChartConfig, ChartType, ColumnSpec, GroupSpec, TeamComparison, SHEET_FIELD};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GROUP_REGEX: Regex =
        Regex::new(r#"(?i)agrupe\s+as\s+abas\s+(.+?)\s+como\s+grupo\s+['"]?([^'".\n]+)"#).unwrap();
    static ref SHEET_SPLIT_REGEX: Regex = Regex::new(r"(?i),|\s+e\s+|\s+and\s+").unwrap();
    static ref COUNT_COLUMN_REGEX: Regex =
        Regex::new(r"(?:[Cc]oluna|[Cc]olumn)\s+([A-Z])\s*\(([^)]+)\)").unwrap();
    static ref DRILLDOWN_REGEX: Regex = Regex::new(r"(?i)drilldown\s*:?\s*([^\n]+)").unwrap();
    static ref DRILLDOWN_ITEM_REGEX: Regex =
        Regex::new(r"(?i)^(.+?)\s+(?:na\s+coluna|in\s+column)\s+([A-Z])$").unwrap();
    static ref TEAM_KEYWORD_REGEX: Regex =
        Regex::new(r#"(?i)(?:palavra|word|cont[ée]m|contains)\s+['"]([^'"]+)['"]"#).unwrap();
    static ref TEAM_A_BUILTIN_REGEX: Regex = Regex::new(r"\bser\b").unwrap();
    static ref TEAM_B_BUILTIN_REGEX: Regex = Regex::new(r"\bcliente\b").unwrap();
}

/// Parse an instruction prompt into a chart configuration
///
/// Never fails: absent, empty or unparseable text returns the default
/// configuration for `known_sheets` (single group "Todos" over every
/// sheet, column H/"Estado", bar chart, totals off, no team comparison).
///
/// # Arguments
/// * `text` - The item's instruction prompt, if any
/// * `known_sheets` - Sheet names present in the uploaded data, used for
///   the fallback group
///
/// # Examples
/// ```
/// use portal::instructions::parse;
///
/// let sheets = vec!["Suporte".to_string(), "Vendas".to_string()];
/// let config = parse(None, &sheets);
/// assert_eq!(config.groups.len(), 1);
/// assert_eq!(config.groups[0].name, "Todos");
/// ```
pub fn parse(text: Option<&str>, known_sheets: &[String]) -> ChartConfig {
    let mut config = ChartConfig::default_for(known_sheets);

    let text = match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return config,
    };
    let lower = text.to_lowercase();

    if let Some(chart_type) = match_chart_type(&lower) {
        config.chart_type = chart_type;
    }
    config.show_totals = match_totals(&lower);
    if let Some(groups) = match_groups(text) {
        config.groups = groups;
    }
    if let Some((column, label)) = match_count_column(text) {
        config.count_column = column;
        config.count_column_label = label;
    }
    config.drilldown_columns = match_drilldown(text);
    config.team_comparison = match_team_comparison(&lower);

    config
}

/// Detect the chart type keyword
///
/// The priority order is fixed (pie, line, area, then bar) rather than
/// first-occurrence-in-text: a prompt containing both "barras" and
/// "pizza" yields a pie chart no matter which word comes first. Kept from
/// the original behavior.
fn match_chart_type(lower: &str) -> Option<ChartType> {
    if lower.contains("pizza") || lower.contains("pie") {
        return Some(ChartType::Pie);
    }
    if lower.contains("linha") || lower.contains("line") {
        return Some(ChartType::Line);
    }
    if lower.contains("área") || lower.contains("area") {
        return Some(ChartType::Area);
    }
    if lower.contains("barra") || lower.contains("bar") {
        return Some(ChartType::Bar);
    }
    None
}

/// Totals are requested by the words "totalizador" or "total"
fn match_totals(lower: &str) -> bool {
    lower.contains("totalizador") || lower.contains("total")
}

/// Collect every "agrupe as abas S1, S2 e S3 como grupo NAME" sentence
///
/// The sheet list is split on commas and the connectives "e"/"and";
/// quotes and surrounding whitespace are trimmed from each name. Returns
/// `None` when no group sentence matches, leaving the fallback group in
/// place.
fn match_groups(text: &str) -> Option<Vec<GroupSpec>> {
    let mut groups = Vec::new();

    for captures in GROUP_REGEX.captures_iter(text) {
        let sheets: Vec<String> = SHEET_SPLIT_REGEX
            .split(&captures[1])
            .map(|name| name.trim_matches(|c: char| c == '\'' || c == '"' || c.is_whitespace()))
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
            .collect();

        let name = captures[2].trim();
        if !sheets.is_empty() {
            groups.push(GroupSpec {
                name: if name.is_empty() {
                    "Grupo".to_string()
                } else {
                    name.to_string()
                },
                sheets,
            });
        }
    }

    if groups.is_empty() { None } else { Some(groups) }
}

/// Match "coluna X (LABEL)" / "column X (LABEL)" with X a single
/// uppercase letter
fn match_count_column(text: &str) -> Option<(String, String)> {
    let captures = COUNT_COLUMN_REGEX.captures(text)?;
    Some((captures[1].to_string(), captures[2].trim().to_string()))
}

/// Parse the drill-down section, if present
///
/// The section starts at the word "drilldown" and runs to the end of the
/// line: a comma-separated list of "LABEL na coluna X" items, or the
/// literal word "aba"/"sheet" for the synthetic sheet-name field. Items
/// that match neither form are skipped. An absent section yields an empty
/// list; the projector derives defaults from the data in that case.
fn match_drilldown(text: &str) -> Vec<ColumnSpec> {
    let captures = match DRILLDOWN_REGEX.captures(text) {
        Some(c) => c,
        None => return Vec::new(),
    };

    let mut columns = Vec::new();
    for item in captures[1].split(',') {
        let item = item.trim().trim_end_matches('.');
        if item.eq_ignore_ascii_case("aba") || item.eq_ignore_ascii_case("sheet") {
            columns.push(ColumnSpec {
                key: SHEET_FIELD.to_string(),
                label: "Aba".to_string(),
            });
        } else if let Some(parts) = DRILLDOWN_ITEM_REGEX.captures(item) {
            columns.push(ColumnSpec {
                key: format!("col_{}", &parts[2]),
                label: parts[1].trim().to_string(),
            });
        }
    }
    columns
}

/// Find the byte offset of a team's marker phrase ("equipe a"/"team a")
fn team_marker(lower: &str, team: char) -> Option<usize> {
    [format!("equipe {}", team), format!("team {}", team)]
        .iter()
        .filter_map(|marker| lower.find(marker.as_str()))
        .min()
}

/// Extract the quoted keywords from one team's block of text
///
/// Scans each line for "palavra '<kw>'" / "contém '<kw>'" fragments and
/// lowercases the results. When no explicit keyword is present but the
/// block mentions a well-known literal token, the corresponding built-in
/// keyword is appended instead.
fn team_keywords(block: &str, builtin_token: &Regex, builtin: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for line in block.lines() {
        for captures in TEAM_KEYWORD_REGEX.captures_iter(line) {
            keywords.push(captures[1].to_lowercase());
        }
    }
    if keywords.is_empty() && builtin_token.is_match(block) {
        keywords.push(builtin.to_string());
    }
    keywords
}

/// Parse team-comparison rules, enabled only when both team markers are
/// present and at least one team ends up with keywords
fn match_team_comparison(lower: &str) -> Option<TeamComparison> {
    let a_start = team_marker(lower, 'a')?;
    let b_start = team_marker(lower, 'b')?;

    // Each team's block runs from its marker to the other team's marker,
    // or to the end of the text when the other marker comes first.
    let a_block = if b_start > a_start {
        &lower[a_start..b_start]
    } else {
        &lower[a_start..]
    };
    let b_block = if a_start > b_start {
        &lower[b_start..a_start]
    } else {
        &lower[b_start..]
    };

    let team_a_keywords = team_keywords(a_block, &TEAM_A_BUILTIN_REGEX, "ser");
    let team_b_keywords = team_keywords(b_block, &TEAM_B_BUILTIN_REGEX, "cliente");

    if team_a_keywords.is_empty() && team_b_keywords.is_empty() {
        return None;
    }
    Some(TeamComparison {
        team_a_keywords,
        team_b_keywords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_prompt_yields_default_config() {
        let known = sheets(&["A", "B"]);
        for text in [None, Some(""), Some("   \n")] {
            let config = parse(text, &known);
            assert_eq!(config.groups.len(), 1);
            assert_eq!(config.groups[0].name, "Todos");
            assert_eq!(config.groups[0].sheets, known);
            assert_eq!(config.count_column, "H");
            assert_eq!(config.count_column_label, "Estado");
            assert_eq!(config.chart_type, ChartType::Bar);
            assert!(config.drilldown_columns.is_empty());
            assert!(!config.show_totals);
            assert!(config.team_comparison.is_none());
        }
    }

    #[test]
    fn fallback_group_always_present() {
        // Unparseable text must still produce at least one group.
        let known = sheets(&["Planilha"]);
        let config = parse(Some("texto sem nenhuma diretiva ,,, ((("), &known);
        assert!(!config.groups.is_empty());
        assert!(!config.groups[0].sheets.is_empty());
    }

    #[test]
    fn parses_group_sentence() {
        let config = parse(
            Some("Agrupe as abas Suporte e Vendas como grupo Atendimento. Coluna H (Estado)."),
            &sheets(&["Suporte Jan", "Vendas Jan"]),
        );
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].name, "Atendimento");
        assert_eq!(config.groups[0].sheets, vec!["Suporte", "Vendas"]);
        assert_eq!(config.count_column, "H");
        assert_eq!(config.count_column_label, "Estado");
    }

    #[test]
    fn parses_multiple_groups_and_quoted_sheets() {
        let text = "Agrupe as abas 'Q1', 'Q2' como grupo Semestre 1\n\
                    Agrupe as abas Q3 e Q4 como grupo Semestre 2";
        let config = parse(Some(text), &sheets(&[]));
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.groups[0].name, "Semestre 1");
        assert_eq!(config.groups[0].sheets, vec!["Q1", "Q2"]);
        assert_eq!(config.groups[1].name, "Semestre 2");
        assert_eq!(config.groups[1].sheets, vec!["Q3", "Q4"]);
    }

    #[test]
    fn count_column_override() {
        let config = parse(Some("Use a coluna D (Situação) para contagem"), &sheets(&[]));
        assert_eq!(config.count_column, "D");
        assert_eq!(config.count_column_label, "Situação");
    }

    #[test]
    fn chart_type_priority_over_text_order() {
        // "barras" appears first but pie wins: the keyword scan uses a
        // fixed priority list, not first occurrence.
        let config = parse(Some("gráfico de barras ou pizza"), &sheets(&[]));
        assert_eq!(config.chart_type, ChartType::Pie);

        assert_eq!(
            parse(Some("gráfico de linha"), &sheets(&[])).chart_type,
            ChartType::Line
        );
        assert_eq!(
            parse(Some("area chart please"), &sheets(&[])).chart_type,
            ChartType::Area
        );
        assert_eq!(
            parse(Some("gráfico de barras"), &sheets(&[])).chart_type,
            ChartType::Bar
        );
    }

    #[test]
    fn totals_flag() {
        assert!(parse(Some("mostrar totalizador"), &sheets(&[])).show_totals);
        assert!(parse(Some("exibir total por grupo"), &sheets(&[])).show_totals);
        assert!(!parse(Some("sem somas"), &sheets(&[])).show_totals);
    }

    #[test]
    fn drilldown_columns_in_source_order() {
        let text = "drilldown: Responsável na coluna C, aba, Prazo na coluna F";
        let config = parse(Some(text), &sheets(&[]));
        assert_eq!(
            config.drilldown_columns,
            vec![
                ColumnSpec {
                    key: "col_C".to_string(),
                    label: "Responsável".to_string()
                },
                ColumnSpec {
                    key: SHEET_FIELD.to_string(),
                    label: "Aba".to_string()
                },
                ColumnSpec {
                    key: "col_F".to_string(),
                    label: "Prazo".to_string()
                },
            ]
        );
    }

    #[test]
    fn team_comparison_with_explicit_keywords() {
        let text = "Equipe A: linhas com a palavra 'interno'\n\
                    Equipe B: linhas que contém 'Cliente'";
        let comparison = parse(Some(text), &sheets(&[])).team_comparison.unwrap();
        assert_eq!(comparison.team_a_keywords, vec!["interno"]);
        assert_eq!(comparison.team_b_keywords, vec!["cliente"]);
    }

    #[test]
    fn team_comparison_builtin_keywords() {
        // Team A names no quoted keyword but mentions SER, so the
        // built-in "ser" keyword applies.
        let text = "Equipe A: chamados SER\nEquipe B: contém 'Cliente'";
        let comparison = parse(Some(text), &sheets(&[])).team_comparison.unwrap();
        assert_eq!(comparison.team_a_keywords, vec!["ser"]);
        assert_eq!(comparison.team_b_keywords, vec!["cliente"]);
    }

    #[test]
    fn team_comparison_disabled_without_keywords() {
        let text = "Equipe A fez muito.\nEquipe B fez pouco.";
        assert!(parse(Some(text), &sheets(&[])).team_comparison.is_none());
    }

    #[test]
    fn team_comparison_requires_both_markers() {
        let text = "Equipe A: contém 'interno'";
        assert!(parse(Some(text), &sheets(&[])).team_comparison.is_none());
    }
}
