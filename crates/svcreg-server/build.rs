use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let git = GitclBuilder::default().sha(true).dirty(true).build();

    match git {
        Ok(git) => {
            Emitter::default().add_instructions(&git)?.emit()?;
        }
        // Source tarballs and container builds pass these in
        Err(_) => {
            for (var, fallback) in [("VERGEN_GIT_SHA", "unknown"), ("VERGEN_GIT_DIRTY", "false")] {
                let value = std::env::var(var).unwrap_or_else(|_| fallback.to_string());
                println!("cargo::rustc-env={var}={value}");
            }
        }
    }

    Ok(())
}
