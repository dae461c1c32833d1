use super::super::ConfigArgs;
use crate::Result;
use crate::config::{ConfigLoadError, write_config};

pub(crate) fn handle(args: ConfigArgs) -> Result<()> {
    let cfg = args.node.resolve()?;
    if let Err(err) = cfg.validate() {
        tracing::warn!("effective config is not runnable: {err}");
    }
    match args.write {
        Some(path) => {
            write_config(&path, &cfg)?;
            println!("wrote {}", path.display());
        }
        None => {
            let rendered = toml::to_string_pretty(&cfg).map_err(ConfigLoadError::from)?;
            print!("{rendered}");
        }
    }
    Ok(())
}
