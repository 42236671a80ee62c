//! Session scripts.
//!
//! A session script is a TOML document listing engine commands to replay
//! against a fresh in-memory repository:
//!
//! ```toml
//! project = "Shop"
//!
//! [[step]]
//! action = "add-diagram"
//! alias = "main"
//! name = "Main"
//!
//! [[step]]
//! action = "add-model-and-view"
//! alias = "customer"
//! diagram = "main"
//! type = "UMLClass"
//! name = "Customer"
//!
//! [[step]]
//! action = "undo"
//! ```
//!
//! Steps refer to earlier results through aliases; `root` always names the
//! project.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::Deserialize;

use armillary::{
    ModelError, Repository,
    config::StoreConfig,
    element::Element,
    identifier::ElementId,
    kind::field,
    value::Value,
};

use crate::error::CliError;

const ROOT_ALIAS: &str = "root";

fn root_alias() -> String {
    ROOT_ALIAS.to_string()
}

fn default_project() -> String {
    "Untitled".to_string()
}

fn default_diagram_type() -> String {
    "UMLClassDiagram".to_string()
}

fn owned_elements() -> String {
    field::OWNED_ELEMENTS.to_string()
}

fn default_true() -> bool {
    true
}

/// A parsed session script.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Name of the project root.
    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// One engine command.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Step {
    AddModel {
        alias: Option<String>,
        #[serde(default = "root_alias")]
        parent: String,
        #[serde(rename = "type")]
        type_name: String,
        name: String,
    },
    AddDiagram {
        alias: Option<String>,
        #[serde(default = "root_alias")]
        parent: String,
        #[serde(rename = "type", default = "default_diagram_type")]
        type_name: String,
        name: String,
    },
    AddModelAndView {
        alias: Option<String>,
        /// Alias for the created view.
        view: Option<String>,
        diagram: String,
        #[serde(default = "root_alias")]
        parent: String,
        #[serde(rename = "type")]
        type_name: String,
        name: String,
        /// Defaults to the model type suffixed with `View`.
        view_type: Option<String>,
    },
    AddRelationship {
        alias: Option<String>,
        #[serde(default = "root_alias")]
        parent: String,
        #[serde(rename = "type")]
        type_name: String,
        source: String,
        target: String,
        #[serde(default = "default_true")]
        directed: bool,
    },
    AddEdgeView {
        alias: Option<String>,
        container: String,
        model: Option<String>,
        #[serde(rename = "type")]
        type_name: String,
        tail: String,
        head: String,
    },
    Delete {
        #[serde(default)]
        models: Vec<String>,
        #[serde(default)]
        views: Vec<String>,
    },
    Set {
        target: String,
        field: String,
        value: Option<toml::Value>,
        /// Alias of an element to reference instead of a literal value.
        reference: Option<String>,
    },
    MoveUp {
        target: String,
    },
    MoveDown {
        target: String,
    },
    Relocate {
        target: String,
        parent: String,
        #[serde(default = "owned_elements")]
        field: String,
    },
    MoveViews {
        views: Vec<String>,
        #[serde(default)]
        dx: f64,
        #[serde(default)]
        dy: f64,
        container: Option<String>,
    },
    Undo,
    Redo,
    Checkpoint,
}

impl Step {
    /// Script spelling of the step's action.
    pub fn action(&self) -> &'static str {
        match self {
            Step::AddModel { .. } => "add-model",
            Step::AddDiagram { .. } => "add-diagram",
            Step::AddModelAndView { .. } => "add-model-and-view",
            Step::AddRelationship { .. } => "add-relationship",
            Step::AddEdgeView { .. } => "add-edge-view",
            Step::Delete { .. } => "delete",
            Step::Set { .. } => "set",
            Step::MoveUp { .. } => "move-up",
            Step::MoveDown { .. } => "move-down",
            Step::Relocate { .. } => "relocate",
            Step::MoveViews { .. } => "move-views",
            Step::Undo => "undo",
            Step::Redo => "redo",
            Step::Checkpoint => "checkpoint",
        }
    }
}

/// A repository plus the aliases bound by the steps replayed so far.
pub struct Session {
    repo: Repository,
    aliases: HashMap<String, ElementId>,
}

impl Session {
    /// Creates a session over an empty project named `project`.
    pub fn new(project: &str, config: StoreConfig) -> Self {
        let repo = Repository::with_config(Element::project(project), config);
        let aliases = HashMap::from([(ROOT_ALIAS.to_string(), repo.root())]);
        Self { repo, aliases }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Looks up the element bound to `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UnknownAlias`] if no earlier step bound it.
    pub fn resolve(&self, alias: &str) -> Result<ElementId, CliError> {
        self.aliases
            .get(alias)
            .copied()
            .ok_or_else(|| CliError::UnknownAlias(alias.to_string()))
    }

    fn resolve_all(&self, aliases: &[String]) -> Result<Vec<ElementId>, CliError> {
        aliases.iter().map(|alias| self.resolve(alias)).collect()
    }

    fn ensure_unbound(&self, alias: Option<&str>) -> Result<(), CliError> {
        match alias {
            Some(alias) if self.aliases.contains_key(alias) => {
                Err(CliError::DuplicateAlias(alias.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn bind(&mut self, alias: Option<&str>, id: ElementId) {
        if let Some(alias) = alias {
            self.aliases.insert(alias.to_string(), id);
        }
    }

    /// Replays `steps` in order.
    ///
    /// Unless `strict` is set, steps rejected by a precondition, or naming an
    /// element that no longer exists, are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not skipped.
    pub fn replay(&mut self, steps: &[Step], strict: bool) -> Result<(), CliError> {
        for (index, step) in steps.iter().enumerate() {
            let number = index + 1;
            match self.apply(number, step) {
                Err(CliError::Step {
                    source: source @ (ModelError::PreconditionFailed(_) | ModelError::NotFound(_)),
                    ..
                }) if !strict => {
                    warn!(step = number, action = step.action(); "Step skipped: {source}");
                }
                result => result?,
            }
        }

        info!(steps = steps.len(), elements = self.repo.len(); "Session replayed");
        Ok(())
    }

    fn apply(&mut self, number: usize, step: &Step) -> Result<(), CliError> {
        debug!(step = number, action = step.action(); "Applying step");
        let failed = |source: ModelError| CliError::Step {
            step: number,
            action: step.action(),
            source,
        };

        match step {
            Step::AddModel {
                alias,
                parent,
                type_name,
                name,
            } => {
                self.ensure_unbound(alias.as_deref())?;
                let parent = self.resolve(parent)?;
                let model = Element::model(type_name, name);
                let id = model.id();
                self.repo
                    .engine()
                    .add_model(parent, field::OWNED_ELEMENTS, model)
                    .map_err(failed)?;
                self.bind(alias.as_deref(), id);
            }
            Step::AddDiagram {
                alias,
                parent,
                type_name,
                name,
            } => {
                self.ensure_unbound(alias.as_deref())?;
                let parent = self.resolve(parent)?;
                let diagram = Element::diagram(type_name, name);
                let id = diagram.id();
                self.repo
                    .engine()
                    .add_model(parent, field::OWNED_ELEMENTS, diagram)
                    .map_err(failed)?;
                self.bind(alias.as_deref(), id);
            }
            Step::AddModelAndView {
                alias,
                view,
                diagram,
                parent,
                type_name,
                name,
                view_type,
            } => {
                self.ensure_unbound(alias.as_deref())?;
                self.ensure_unbound(view.as_deref())?;
                let diagram = self.resolve(diagram)?;
                let parent = self.resolve(parent)?;
                let view_type = view_type
                    .clone()
                    .unwrap_or_else(|| format!("{type_name}View"));
                let model = Element::model(type_name, name);
                let node = Element::node_view(&view_type, None);
                let (model_id, view_id) = (model.id(), node.id());
                self.repo
                    .engine()
                    .add_model_and_view(diagram, model, node, parent, field::OWNED_ELEMENTS)
                    .map_err(failed)?;
                self.bind(alias.as_deref(), model_id);
                self.bind(view.as_deref(), view_id);
            }
            Step::AddRelationship {
                alias,
                parent,
                type_name,
                source,
                target,
                directed,
            } => {
                self.ensure_unbound(alias.as_deref())?;
                let parent = self.resolve(parent)?;
                let (source, target) = (self.resolve(source)?, self.resolve(target)?);
                let relationship = if *directed {
                    Element::directed_relationship(type_name, source, target)
                } else {
                    Element::undirected_relationship(type_name, source, target)
                };
                let id = relationship.id();
                self.repo
                    .engine()
                    .add_relationship(parent, relationship)
                    .map_err(failed)?;
                self.bind(alias.as_deref(), id);
            }
            Step::AddEdgeView {
                alias,
                container,
                model,
                type_name,
                tail,
                head,
            } => {
                self.ensure_unbound(alias.as_deref())?;
                let container = self.resolve(container)?;
                let model = model.as_deref().map(|model| self.resolve(model)).transpose()?;
                let edge =
                    Element::edge_view(type_name, model, self.resolve(tail)?, self.resolve(head)?);
                let id = edge.id();
                self.repo
                    .engine()
                    .add_view(container, edge)
                    .map_err(failed)?;
                self.bind(alias.as_deref(), id);
            }
            Step::Delete { models, views } => {
                let models = self.resolve_all(models)?;
                let views = self.resolve_all(views)?;
                self.repo
                    .engine()
                    .delete_elements(&models, &views)
                    .map_err(failed)?;
            }
            Step::Set {
                target,
                field,
                value,
                reference,
            } => {
                let target = self.resolve(target)?;
                let value = match (value, reference) {
                    (Some(_), Some(_)) => {
                        return Err(CliError::UnsupportedValue {
                            field: field.clone(),
                            reason: "set either `value` or `reference`, not both".to_string(),
                        });
                    }
                    (Some(value), None) => to_value(field, value)?,
                    (None, Some(reference)) => Value::Ref(self.resolve(reference)?),
                    (None, None) => Value::Null,
                };
                self.repo
                    .engine()
                    .set_property(target, field, value)
                    .map_err(failed)?;
            }
            Step::MoveUp { target } => {
                let target = self.resolve(target)?;
                self.repo.engine().move_up(target).map_err(failed)?;
            }
            Step::MoveDown { target } => {
                let target = self.resolve(target)?;
                self.repo.engine().move_down(target).map_err(failed)?;
            }
            Step::Relocate {
                target,
                parent,
                field,
            } => {
                let target = self.resolve(target)?;
                let parent = self.resolve(parent)?;
                self.repo
                    .engine()
                    .relocate(target, parent, field)
                    .map_err(failed)?;
            }
            Step::MoveViews {
                views,
                dx,
                dy,
                container,
            } => {
                let views = self.resolve_all(views)?;
                let result = match container {
                    Some(container) => {
                        let container = self.resolve(container)?;
                        self.repo
                            .engine()
                            .move_views_changing_container(&views, *dx, *dy, container)
                    }
                    None => self.repo.engine().move_views(&views, *dx, *dy),
                };
                result.map_err(failed)?;
            }
            Step::Undo => {
                if self.repo.undo().map_err(failed)?.is_none() {
                    info!(step = number; "Nothing to undo");
                }
            }
            Step::Redo => {
                if self.repo.redo().map_err(failed)?.is_none() {
                    info!(step = number; "Nothing to redo");
                }
            }
            Step::Checkpoint => self.repo.checkpoint(),
        }
        Ok(())
    }
}

/// Converts a TOML literal into a field value.
fn to_value(field: &str, value: &toml::Value) -> Result<Value, CliError> {
    let value = match value {
        toml::Value::String(text) => Value::Text(text.clone()),
        toml::Value::Integer(number) => Value::Int(*number),
        toml::Value::Float(number) => Value::Real(*number),
        toml::Value::Boolean(flag) => Value::Bool(*flag),
        toml::Value::Datetime(datetime) => Value::Text(datetime.to_string()),
        toml::Value::Array(items) => Value::List(
            items
                .iter()
                .map(|item| to_value(field, item))
                .collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(_) => {
            return Err(CliError::UnsupportedValue {
                field: field.to_string(),
                reason: "tables cannot be stored in a field".to_string(),
            });
        }
    };
    Ok(value)
}
