//! Tagger setup: CLI overrides on top of the loaded config.

use wdtag_core::{Config, ModelRegistry, Tagger};

use super::TagArgs;

/// Apply command-line overrides to `config` and validate the result.
pub fn apply_overrides(mut config: Config, args: &TagArgs) -> anyhow::Result<Config> {
    if let Some(model) = &args.model {
        config.general.model = model.clone();
    }
    if let Some(threshold) = args.threshold {
        config.tagging.threshold = threshold;
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Check inputs and the model, then build the tagger.
pub fn setup_tagger(config: Config, args: &TagArgs) -> anyhow::Result<Tagger> {
    if let Some(missing) = args.inputs.iter().find(|p| !p.exists()) {
        anyhow::bail!(
            "Input path does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            missing
        );
    }

    let config = apply_overrides(config, args)?;

    let registry = ModelRegistry::new(config.model_dir());
    if !registry.is_installed(&config.general.model) {
        tracing::warn!(
            "Model {} not found in {:?}. Run `wdtag models download {}` to install it.",
            config.general.model,
            registry.root(),
            config.general.model
        );
    }

    tracing::info!(
        "Using model {} (threshold {}), writing tags to {:?}",
        config.general.model,
        config.tagging.threshold,
        config.output_dir()
    );

    let tagger = if args.cache_model {
        Tagger::with_cached_model(config)
    } else {
        Tagger::new(config)
    };
    Ok(tagger)
}
