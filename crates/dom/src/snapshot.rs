//! Deterministic tree serialization and equality for tests.
//!
//! Equivalence rules:
//! - Node identities must match (snapshots are compared within one arena).
//! - Element names and ordered attribute lists must match.
//! - Text contents must match exactly.
//! - Child order is significant.
//!
//! Not a public stable format; intended for internal test comparisons.

use std::fmt::{self, Write};

use crate::tree::{Dom, NodeId};

#[derive(Clone, Copy, Debug)]
pub struct SnapshotOptions {
    pub attributes: bool,
    pub text: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            attributes: true,
            text: true,
        }
    }
}

impl SnapshotOptions {
    /// Shape and identity only; property values are left out.
    pub fn structure() -> Self {
        Self {
            attributes: false,
            text: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeSnapshot {
    lines: Vec<String>,
}

impl TreeSnapshot {
    pub fn capture(dom: &Dom, root: NodeId) -> Self {
        Self::capture_with(dom, root, SnapshotOptions::default())
    }

    pub fn capture_with(dom: &Dom, root: NodeId, options: SnapshotOptions) -> Self {
        let mut lines = Vec::new();
        walk(dom, root, 0, &options, &mut lines);
        Self { lines }
    }

    pub fn as_lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for TreeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn walk(dom: &Dom, node: NodeId, depth: usize, options: &SnapshotOptions, out: &mut Vec<String>) {
    let mut line = " ".repeat(depth * 2);
    write_node_line(&mut line, dom, node, options);
    out.push(line);
    for child in dom.children(node) {
        walk(dom, *child, depth + 1, options, out);
    }
}

fn write_node_line(out: &mut String, dom: &Dom, node: NodeId, options: &SnapshotOptions) {
    if let Some(name) = dom.name(node) {
        out.push('<');
        out.push_str(name);
        if options.attributes {
            for (key, value) in dom.attributes(node) {
                let _ = write!(out, " {key}=\"{value}\"");
            }
        }
        let _ = write!(out, "> #{}", node.0);
    } else if options.text {
        let text = dom.text(node).unwrap_or("");
        let _ = write!(out, "{text:?} #{}", node.0);
    } else {
        let _ = write!(out, "#text #{}", node.0);
    }
}

#[derive(Debug)]
pub struct TreeMismatch {
    line: usize,
    expected: String,
    actual: String,
    expected_tree: String,
    actual_tree: String,
}

impl fmt::Display for TreeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tree mismatch at line {}:", self.line)?;
        writeln!(f, "expected: {}", self.expected)?;
        writeln!(f, "actual:   {}", self.actual)?;
        writeln!(f, "expected tree:\n{}", self.expected_tree)?;
        writeln!(f, "actual tree:\n{}", self.actual_tree)?;
        Ok(())
    }
}

impl std::error::Error for TreeMismatch {}

pub fn compare_snapshots(
    expected: &TreeSnapshot,
    actual: &TreeSnapshot,
) -> Result<(), Box<TreeMismatch>> {
    let len = expected.lines.len().max(actual.lines.len());
    for i in 0..len {
        let exp = expected.lines.get(i).map(String::as_str).unwrap_or("<end>");
        let act = actual.lines.get(i).map(String::as_str).unwrap_or("<end>");
        if exp != act {
            return Err(Box::new(TreeMismatch {
                line: i + 1,
                expected: exp.to_string(),
                actual: act.to_string(),
                expected_tree: expected.render(),
                actual_tree: actual.render(),
            }));
        }
    }
    Ok(())
}

pub fn assert_tree_eq(expected: &TreeSnapshot, actual: &TreeSnapshot) {
    if let Err(mismatch) = compare_snapshots(expected, actual) {
        panic!("{mismatch}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_renders_shape_attributes_and_ids() {
        let mut dom = Dom::new();
        let root = dom.create_element("root");
        let a = dom.create_element("a");
        dom.set_attribute(a, "id", "x").expect("set failed");
        let t = dom.create_text("hi");
        dom.append(root, a).expect("append failed");
        dom.append(a, t).expect("append failed");

        let snap = TreeSnapshot::capture(&dom, root);
        assert_eq!(
            snap.as_lines(),
            &[
                format!("<root> #{}", root.0),
                format!("  <a id=\"x\"> #{}", a.0),
                format!("    \"hi\" #{}", t.0),
            ]
        );
    }

    #[test]
    fn compare_reports_first_divergence() {
        let mut dom = Dom::new();
        let root = dom.create_element("root");
        let a = dom.create_element("a");
        dom.append(root, a).expect("append failed");
        let before = TreeSnapshot::capture(&dom, root);
        dom.set_attribute(a, "id", "x").expect("set failed");
        let after = TreeSnapshot::capture(&dom, root);

        let err = compare_snapshots(&before, &after).expect_err("expected mismatch");
        assert_eq!(err.line, 2);
        assert!(err.to_string().contains("id=\"x\""));
    }
}
