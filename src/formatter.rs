/// Qualifies application event names with the configured namespace.
///
/// A leading `.` (or `\`) marks a name as already fully qualified: the marker
/// is stripped and the rest is used verbatim. Any other name is prefixed with
/// `namespace.` when a namespace is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFormatter {
    namespace: Option<String>,
}

impl EventFormatter {
    pub fn new(namespace: Option<&str>) -> Self {
        let mut formatter = Self::default();
        formatter.set_namespace(namespace);
        formatter
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// An empty namespace disables prefixing.
    pub fn set_namespace(&mut self, namespace: Option<&str>) {
        self.namespace = namespace
            .map(|ns| ns.trim_end_matches('.'))
            .filter(|ns| !ns.is_empty())
            .map(str::to_string);
    }

    pub fn format(&self, event: &str) -> String {
        if let Some(qualified) = event.strip_prefix(['.', '\\']) {
            return qualified.to_string();
        }

        match &self.namespace {
            Some(namespace) => format!("{namespace}.{event}"),
            None => event.to_string(),
        }
    }

    /// Reverse of [`format`](Self::format) for names seen on the wire.
    ///
    /// Names under the namespace lose the prefix; anything else comes back
    /// with a leading `.` so it can be fed straight into `listen` again.
    pub fn strip(&self, wire_event: &str) -> String {
        if let Some(namespace) = &self.namespace {
            if let Some(rest) = wire_event
                .strip_prefix(namespace.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
            {
                return rest.to_string();
            }
        }

        format!(".{wire_event}")
    }
}
