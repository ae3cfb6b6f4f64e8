#[cfg(test)]
pub mod test {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use crate::logging::LogConfig;
    use crate::types::{IpNet, Masked};

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct TestConfig {
        /// The application host.
        pub host: String,

        /// The port number.
        pub port: u16,

        /// Enable debug mode.
        pub debug: bool,

        /// Database settings.
        pub database: TestDbConfig,

        /// Request timeout.
        pub timeout: Duration,

        /// Allowed client names.
        pub allowed: Vec<String>,

        /// Network clients may connect from.
        pub network: Option<IpNet>,

        /// API token.
        pub token: Masked<String>,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            Self {
                host: "localhost".into(),
                port: 8080,
                debug: false,
                database: TestDbConfig::default(),
                timeout: Duration::from_secs(30),
                allowed: Vec::new(),
                network: None,
                token: Masked::default(),
            }
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct TestDbConfig {
        /// Connection string URL.
        pub url: Option<String>,

        /// Connection pool size.
        pub pool_size: usize,
    }

    impl Default for TestDbConfig {
        fn default() -> Self {
            Self {
                url: None,
                pool_size: 5,
            }
        }
    }

    // -- Fixture for enum tests ------------------------------------------------

    #[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum Mode {
        #[default]
        Fast,
        Slow,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
    pub struct ModeConfig {
        pub mode: Mode,
    }

    // -- Fixture embedding the common section, kebab-case keys -----------------

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(rename_all = "kebab-case")]
    pub struct ServeConfig {
        pub log: LogConfig,
        pub listen_addr: String,
        pub max_connections: u32,
    }

    impl Default for ServeConfig {
        fn default() -> Self {
            Self {
                log: LogConfig::default(),
                listen_addr: "127.0.0.1:8080".into(),
                max_connections: 64,
            }
        }
    }
}
