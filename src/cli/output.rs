//! Operator-facing text helpers shared by the subcommands.

use std::fmt::Display;

const RULE_WIDTH: usize = 64;

pub fn section(title: &str) {
    println!("\n{title}\n{}", "─".repeat(RULE_WIDTH));
}

/// Aligned `label value` line inside a section.
pub fn key_value(label: &str, value: impl Display) {
    println!("  {label:<14} {value}");
}

/// `✓` or `⚠` followed by `message`.
pub fn status(passed: bool, message: &str) {
    let mark = if passed { '✓' } else { '⚠' };
    println!("{mark} {message}");
}

/// Indent a rendered table under the current section.
pub fn table(rendered: &str) {
    rendered.lines().for_each(|line| println!("  {line}"));
}
