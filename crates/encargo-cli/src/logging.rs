use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    /// Reads `ENCARGO_ENV`; anything unrecognised counts as dev.
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("ENCARGO_ENV").unwrap_or_default())
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(self) -> bool {
        matches!(self, Self::Dev)
    }
}

fn default_directives(env: Environment) -> &'static str {
    match env {
        Environment::Dev => "encargo_cli=debug,encargo_web=debug,encargo_browse=debug,encargo_geo=debug,tower_http=debug,info",
        Environment::Staging => "encargo_web=debug,tower_http=info,info",
        Environment::Prod => "encargo_web=info,tower_http=info,warn",
    }
}

pub fn init_logging(env: Environment) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(env).into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    if matches!(env, Environment::Prod) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .init();
    }

    tracing::debug!(?env, "logging initialized");
}
