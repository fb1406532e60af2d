//! Check command implementation.

use std::path::Path;

use crate::schema::OptionsFile;

/// Runs the check command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = OptionsFile::load(path)?;
    match file.to_options() {
        Ok(options) => {
            println!("✓ {} is valid", path.display());
            println!();
            println!("  resource:        {}", options.resource());
            println!("  mode:            {}", options.mode());
            println!("  propagation:     {}", options.propagation());
            println!("  read only:       {}", options.read_only());
            println!(
                "  isolation level: {}",
                options.isolation_level().unwrap_or("(provider default)")
            );
            match options.timeout() {
                Some(timeout) => println!("  timeout:         {:?}", timeout),
                None => println!("  timeout:         none"),
            }
            println!("  retry count:     {}", options.retry_count());
            println!("  retry backoff:   {:?}", options.retry_backoff());
            println!("  rollback for:    {:?}", options.rollback_for());
            Ok(())
        }
        Err(err) => {
            println!("✗ {} is invalid", path.display());
            for (key, value) in err.details() {
                println!("  {key}: {value}");
            }
            Err(err.into())
        }
    }
}
