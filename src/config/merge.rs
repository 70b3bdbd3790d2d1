use crate::config::types::*;

/// Trait for merging optional configuration values
pub trait Merge<T> {
    fn merge(self, other: T) -> T;
}

impl<T> Merge<Option<T>> for Option<T> {
    fn merge(self, other: Option<T>) -> Option<T> {
        other.or(self)
    }
}

fn merge_nested<T>(a: Option<T>, b: Option<T>, merge_with: fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (Some(a), Some(b)) => Some(merge_with(a, b)),
    }
}

impl Merge<ConfigInput> for ConfigInput {
    fn merge(self, other: ConfigInput) -> ConfigInput {
        ConfigInput {
            server: merge_nested(self.server, other.server, ServerInput::merge_with),
            database: merge_nested(self.database, other.database, DatabaseInput::merge_with),
            definition: merge_nested(
                self.definition,
                other.definition,
                DefinitionInput::merge_with,
            ),
            logging: merge_nested(self.logging, other.logging, LoggingInput::merge_with),
        }
    }
}

impl ServerInput {
    /// A URL from the later layer replaces a Docker block from the earlier one
    pub fn merge_with(self, other: ServerInput) -> ServerInput {
        if other.url.is_some() {
            return ServerInput {
                url: other.url,
                docker: None,
            };
        }
        ServerInput {
            url: self.url,
            docker: other.docker.merge(self.docker),
        }
    }
}

impl DatabaseInput {
    pub fn merge_with(self, other: DatabaseInput) -> DatabaseInput {
        DatabaseInput {
            name: self.name.merge(other.name),
            unique: self.unique.merge(other.unique),
        }
    }
}

impl DefinitionInput {
    pub fn merge_with(self, other: DefinitionInput) -> DefinitionInput {
        DefinitionInput {
            resource_namespace: self.resource_namespace.merge(other.resource_namespace),
            test_script_namespace: self.test_script_namespace.merge(other.test_script_namespace),
            ordered_resources: self.ordered_resources.merge(other.ordered_resources),
            allow_duplicates: self.allow_duplicates.merge(other.allow_duplicates),
            resource_dir: self.resource_dir.merge(other.resource_dir),
        }
    }
}

impl LoggingInput {
    pub fn merge_with(self, other: LoggingInput) -> LoggingInput {
        LoggingInput {
            file: self.file.merge(other.file),
            filter: self.filter.merge(other.filter),
        }
    }
}
