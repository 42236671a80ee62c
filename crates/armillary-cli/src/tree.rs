//! Plain-text report of a repository's element tree.

use std::fmt;

use armillary::{Repository, element::Element, identifier::ElementId, kind::field};

const INDENT: &str = "  ";

/// Displays every element reachable from the project root, one per line,
/// followed by the state of the undo history.
///
/// ```text
/// project Project "Shop" #1
///   model UMLClass "Customer" #2
///   diagram UMLClassDiagram "Main" #3
///     node-view UMLClassView #4 [model=#2] at (10, 20)
/// undo: Add UMLClass
/// redo: -
/// modified: true
/// ```
pub struct TreeView<'a>(pub &'a Repository);

impl TreeView<'_> {
    fn write_element(&self, f: &mut fmt::Formatter<'_>, id: ElementId, depth: usize) -> fmt::Result {
        let Ok(element) = self.0.get(id) else {
            return writeln!(f, "{}<missing {id}>", INDENT.repeat(depth));
        };

        write!(f, "{}", INDENT.repeat(depth))?;
        write_line(f, element)?;
        writeln!(f)?;

        for (_, child) in element.owned_children() {
            self.write_element(f, child, depth + 1)?;
        }
        Ok(())
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, element: &Element) -> fmt::Result {
    write!(f, "{} {}", element.kind(), element.type_name())?;
    if let Some(name) = element.name() {
        write!(f, " {name:?}")?;
    }
    write!(f, " {}", element.id())?;

    let references: Vec<String> = element
        .references()
        .map(|(name, id)| format!("{name}={id}"))
        .collect();
    if !references.is_empty() {
        write!(f, " [{}]", references.join(", "))?;
    }

    let (left, top) = (element.get(field::LEFT), element.get(field::TOP));
    if !left.is_null() || !top.is_null() {
        write!(f, " at ({left}, {top})")?;
    }
    Ok(())
}

impl fmt::Display for TreeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repo = self.0;
        self.write_element(f, repo.root(), 0)?;
        writeln!(f, "undo: {}", repo.undo_label().unwrap_or("-"))?;
        writeln!(f, "redo: {}", repo.redo_label().unwrap_or("-"))?;
        writeln!(f, "modified: {}", repo.is_modified())
    }
}
