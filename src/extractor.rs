//! The extraction pipeline: provider → parser → filter/flatten → renderer.

use crate::config::Config;
use crate::error::Result;
use crate::filter::{self, DenyList, FlattenOptions};
use crate::model::VariableSet;
use crate::parser::PayloadParser;
use crate::provider::{DecryptionProvider, RawToolOutput};
use crate::render::{self, RenderFormat};
use std::path::Path;
use tracing::debug;

/// Runs one extraction with a given provider.
pub struct Extractor<P> {
    provider: P,
    parser: PayloadParser,
    deny: DenyList,
    flatten: FlattenOptions,
}

impl<P: DecryptionProvider> Extractor<P> {
    pub fn new(provider: P, parser: PayloadParser, deny: DenyList, flatten: FlattenOptions) -> Self {
        Self {
            provider,
            parser,
            deny,
            flatten,
        }
    }

    /// Build the parser, deny-list and flatten options from `config`.
    pub fn from_config(provider: P, config: &Config) -> Result<Self> {
        config.validate()?;
        let parser = PayloadParser::new(&config.host, &config.payload_key, config.dialect)?;
        Ok(Self::new(
            provider,
            parser,
            config.deny_list(),
            config.flatten_options()?,
        ))
    }

    /// Decrypt `source` and render its variables in `format`.
    ///
    /// The returned text is complete; nothing is produced on error.
    pub fn run(&self, source: &Path, credential: &Path, format: RenderFormat) -> Result<String> {
        let raw = self.provider.decrypt(source, credential)?;

        match format {
            RenderFormat::Debug => Ok(render::render_debug(&raw)),
            RenderFormat::Structured => Ok(render::render_structured(&self.extract(&raw)?)),
            RenderFormat::EnvExport => render::render_env(&self.extract(&raw)?),
        }
    }

    /// Parse, filter and flatten raw tool output.
    pub fn extract(&self, raw: &RawToolOutput) -> Result<VariableSet> {
        let variables = self.parser.parse(&raw.stdout)?;
        let variables = filter::filter(variables, &self.deny);
        let set = filter::flatten(variables, self.flatten);
        debug!(provider = self.provider.name(), variables = set.len(), "extracted variables");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::model::Value;

    struct CannedProvider(RawToolOutput);

    impl DecryptionProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        fn decrypt(&self, _source: &Path, _credential: &Path) -> Result<RawToolOutput> {
            Ok(self.0.clone())
        }
    }

    fn extractor(stdout: &str) -> Extractor<CannedProvider> {
        let raw = RawToolOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            status: Some(0),
        };
        Extractor::from_config(CannedProvider(raw), &Config::default()).unwrap()
    }

    const OUTPUT: &str = r#"localhost | SUCCESS => {
    "hostvars[inventory_hostname]": {
        "ansible_check_mode": false,
        "db": {"host": "localhost", "port": 5432},
        "inventory_hostname": "localhost",
        "groups": {"all": ["localhost"], "ungrouped": ["localhost"]}
    }
}"#;

    #[test]
    fn test_extract_filters_and_flattens() {
        let raw = RawToolOutput {
            stdout: OUTPUT.to_string(),
            stderr: String::new(),
            status: Some(0),
        };
        let set = extractor(OUTPUT).extract(&raw).unwrap();

        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["db_host", "db_port"]);
        assert_eq!(set.get("db_port"), Some(&Value::Integer(5432)));
    }

    #[test]
    fn test_run_structured() {
        let out = extractor(OUTPUT)
            .run(Path::new("s.yml"), Path::new("p"), RenderFormat::Structured)
            .unwrap();
        assert_eq!(out, "db_host: \"localhost\"\ndb_port: 5432\n");
    }

    #[test]
    fn test_run_debug_skips_parsing() {
        let out = extractor("not a payload at all")
            .run(Path::new("s.yml"), Path::new("p"), RenderFormat::Debug)
            .unwrap();
        assert_eq!(out, "not a payload at all\n");
    }

    #[test]
    fn test_run_rejects_invalid_config() {
        let config = Config {
            separator: "::".into(),
            ..Config::default()
        };
        let raw = RawToolOutput {
            stdout: String::new(),
            stderr: String::new(),
            status: Some(0),
        };
        assert!(matches!(
            Extractor::from_config(CannedProvider(raw), &config),
            Err(ExtractError::InvalidConfig(_))
        ));
    }
}
