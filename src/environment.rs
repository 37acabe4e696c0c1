use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Environment {
    Local,
    Staging,
    Production,
}

pub const ALL: [Environment; 3] = [
    Environment::Local,
    Environment::Staging,
    Environment::Production,
];

pub fn environment_name(environment: Environment) -> &'static str {
    match environment {
        Environment::Local => "Local",
        Environment::Staging => "Staging",
        Environment::Production => "Production",
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(environment_name(*self))
    }
}

/// Finds the environment named in free-form command text.
///
/// Matching is case-sensitive on the literal words. When the text names
/// more than one environment, the one that occurs first wins.
pub fn match_environment(text: &str) -> Option<Environment> {
    ALL.iter()
        .filter_map(|environment| {
            text.find(environment_name(*environment))
                .map(|offset| (offset, *environment))
        })
        .min_by_key(|(offset, _)| *offset)
        .map(|(_, environment)| environment)
}

pub fn parse_environment(value: &str) -> Option<Environment> {
    ALL.iter()
        .copied()
        .find(|environment| environment_name(*environment) == value)
}
