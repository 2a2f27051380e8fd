use crate::config::AppConfig;
use crate::crs::Crs;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Everything one command run needs: configuration, the tract CRS, a seeded
/// RNG and the list of files written. Created at the start of a command
/// and closed with [`Session::finish`].
pub struct Session {
    pub config: AppConfig,
    pub tract_crs: Crs,
    rng: StdRng,
    started: Instant,
    artifacts: Vec<PathBuf>,
}

impl Session {
    pub fn start(config: AppConfig) -> Result<Self> {
        let tract_crs = Crs::parse(&config.input.tract_crs)
            .with_context(|| format!("Invalid tract CRS '{}'", config.input.tract_crs))?;
        for dir in [&config.output.visuals_dir, &config.output.maps_dir, &config.input.data_dir] {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        let rng = StdRng::seed_from_u64(config.statistics.seed);
        info!("Session started (tract CRS {}, seed {})", tract_crs, config.statistics.seed);

        Ok(Session {
            config,
            tract_crs,
            rng,
            started: Instant::now(),
            artifacts: Vec::new(),
        })
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn visual(&self, name: &str) -> PathBuf {
        self.config.output.visuals_dir.join(name)
    }

    pub fn map(&self, name: &str) -> PathBuf {
        self.config.output.maps_dir.join(name)
    }

    pub fn data(&self, name: &str) -> PathBuf {
        self.config.input.data_dir.join(name)
    }

    pub fn record(&mut self, path: &Path) {
        info!("Wrote {:?}", path);
        self.artifacts.push(path.to_path_buf());
    }

    /// Ends the run and returns the files it produced.
    pub fn finish(self) -> Vec<PathBuf> {
        info!(
            "Finished in {:.1?}, {} file(s) written",
            self.started.elapsed(),
            self.artifacts.len()
        );
        self.artifacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.output.visuals_dir = dir.join("visuals");
        config.output.maps_dir = dir.join("maps");
        config.input.data_dir = dir.join("data");
        config
    }

    #[test]
    fn start_creates_output_dirs_and_tracks_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::start(config_in(dir.path())).unwrap();
        assert!(dir.path().join("visuals").is_dir());
        assert!(dir.path().join("maps").is_dir());
        assert!(dir.path().join("data").is_dir());

        let chart = session.visual("chart.png");
        assert_eq!(chart, dir.path().join("visuals").join("chart.png"));
        session.record(&chart);
        assert_eq!(session.finish(), vec![chart]);
    }

    #[test]
    fn rng_is_seeded_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = Session::start(config_in(dir.path())).unwrap();
        let mut b = Session::start(config_in(dir.path())).unwrap();
        assert_eq!(a.rng().gen::<u64>(), b.rng().gen::<u64>());
    }

    #[test]
    fn bad_crs_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.input.tract_crs = "+proj=robin".into();
        assert!(Session::start(config).is_err());
    }
}
