//! Single-frame pipeline execution.
//!
//! `FramePipeline` drives one frame through the fixed stage sequence:
//! prepare, split, geometry derivation, grid submission, grid wait, and
//! hypothesis generation. The first failure stops that frame and is
//! recorded with its stage; nothing a frame does can abort its siblings.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{float_arg, RunConfig};
use crate::frame::Frame;
use crate::mae::{self, Centroid, MaeError};
use crate::stage::{Stage, StageError, StageRunner};
use crate::suite::{SchrodingerSuite, PV_CONVERT_SCRIPT};
use crate::waiter::{ArtifactWaiter, WaitError, GRID_ARCHIVE_PATTERN};

use super::state::{FrameReport, FrameState};

/// Errors that stop a frame's pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage command failed.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// The ligand structure could not yield a centroid.
    #[error(transparent)]
    Geometry(#[from] MaeError),

    /// Waiting for the grid archive failed.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// A filesystem step between stages failed.
    #[error("Stage {stage} {detail}: {source}")]
    Io {
        stage: Stage,
        detail: String,
        source: io::Error,
    },
}

impl PipelineError {
    /// The stage the frame was in when the error occurred.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Stage(error) => error.stage(),
            PipelineError::Geometry(_) => Stage::GeometryDerive,
            PipelineError::Wait(_) => Stage::WaitForGrid,
            PipelineError::Io { stage, .. } => *stage,
        }
    }
}

fn io_error(stage: Stage, detail: &str, source: io::Error) -> PipelineError {
    PipelineError::Io {
        stage,
        detail: detail.to_string(),
        source,
    }
}

/// Shared collaborators handed to every frame pipeline in a run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineContext<'a> {
    pub suite: &'a SchrodingerSuite,
    pub stages: &'a StageRunner,
    pub waiter: &'a ArtifactWaiter,
    pub config: &'a RunConfig,
    /// Shared working directory; every file a frame touches is namespaced
    /// by its index, so concurrent frames do not collide.
    pub workdir: &'a Path,
}

/// Runs one frame to a terminal state.
pub struct FramePipeline<'a> {
    frame: Frame,
    ctx: PipelineContext<'a>,
    state: FrameState,
}

impl<'a> FramePipeline<'a> {
    /// Creates a pipeline for `frame` in the `Pending` state.
    pub fn new(frame: Frame, ctx: PipelineContext<'a>) -> Self {
        Self {
            frame,
            ctx,
            state: FrameState::Pending,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// Drives the frame through every stage and reports the outcome.
    ///
    /// Never returns an error: failures are folded into the report so the
    /// caller can aggregate outcomes without special-casing.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> FrameReport {
        let index = self.frame.index();
        let started = Instant::now();
        info!(frame = index, source = %self.frame.source().display(), "Processing frame");

        match self.drive(&mut cancel).await {
            Ok(artifact) => {
                self.advance(FrameState::Done);
                info!(
                    frame = index,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Frame complete"
                );
                FrameReport::done(index, artifact, started.elapsed())
            }
            Err(error) => {
                let stage = error.stage();
                let reason = error.to_string();
                warn!(frame = index, stage = %stage, error = %reason, "Frame failed");
                self.advance(FrameState::Failed {
                    stage,
                    reason: reason.clone(),
                });
                FrameReport::failed(index, stage, reason, started.elapsed())
            }
        }
    }

    async fn drive(
        &mut self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<PathBuf, PipelineError> {
        self.prepare(cancel).await?;
        self.split(cancel).await?;
        let centroid = self.derive_geometry()?;
        self.generate_grid(&centroid, cancel).await?;
        self.await_grid(cancel).await?;
        self.generate_hypothesis(&centroid, cancel).await?;

        Ok(self.ctx.workdir.join(self.frame.hypothesis_artifact_name()))
    }

    fn advance(&mut self, next: FrameState) {
        debug!(frame = self.frame.index(), from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    /// Stages a working copy of the input and runs PrepWizard over it,
    /// renaming the pH-tagged output to the canonical prepared name and
    /// clearing protassign scratch files.
    async fn prepare(&mut self, cancel: &mut watch::Receiver<bool>) -> Result<(), PipelineError> {
        self.advance(FrameState::Preparing);

        let work = self.ctx.workdir.join(self.frame.work_name());
        tokio::fs::copy(self.frame.source(), &work)
            .await
            .map_err(|source| io_error(Stage::Prepare, "could not stage input copy", source))?;

        let ph = self.ctx.config.propka_ph;
        let raw = self.frame.prepared_raw_name(ph);
        self.ctx
            .stages
            .run(
                Stage::Prepare,
                self.ctx.workdir,
                &self.ctx.suite.prepwizard(),
                [
                    self.frame.work_name(),
                    raw.clone(),
                    "-NOJOBID".to_string(),
                    "-noimpref".to_string(),
                    "-noepik".to_string(),
                    "-propka_pH".to_string(),
                    float_arg(ph),
                    "-keepfarwat".to_string(),
                ],
                cancel,
            )
            .await?;

        tokio::fs::rename(
            self.ctx.workdir.join(&raw),
            self.ctx.workdir.join(self.frame.prepared_name()),
        )
        .await
        .map_err(|source| io_error(Stage::Prepare, "could not rename prepared output", source))?;

        self.remove_scratch().await;
        Ok(())
    }

    /// Removes PrepWizard's protassign leftovers one by one; a file that
    /// never appeared is fine, and a file that cannot be removed is
    /// logged and left behind. Leftover scratch never blocks the frame's
    /// remaining stages.
    async fn remove_scratch(&self) {
        for name in self.frame.protassign_scratch_names() {
            match tokio::fs::remove_file(self.ctx.workdir.join(&name)).await {
                Ok(()) => {
                    debug!(frame = self.frame.index(), file = %name, "Removed scratch file");
                }
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => {
                    warn!(
                        frame = self.frame.index(),
                        file = %name,
                        error = %error,
                        "Could not remove scratch file"
                    );
                }
            }
        }
    }

    /// Extracts the ligand and receptor structures from the prepared file.
    async fn split(&mut self, cancel: &mut watch::Receiver<bool>) -> Result<(), PipelineError> {
        self.advance(FrameState::Splitting);

        let prepared = self.frame.prepared_name();
        for (mode, output) in [
            ("split_ligand", self.frame.ligand_name()),
            ("split_receptor", self.frame.receptor_name()),
        ] {
            self.ctx
                .stages
                .run(
                    Stage::Split,
                    self.ctx.workdir,
                    &self.ctx.suite.run_launcher(),
                    [
                        PV_CONVERT_SCRIPT,
                        "-mode",
                        mode,
                        prepared.as_str(),
                        "-o",
                        output.as_str(),
                    ],
                    cancel,
                )
                .await?;
        }

        Ok(())
    }

    /// Computes the ligand centroid that centers the grid and hypothesis.
    fn derive_geometry(&mut self) -> Result<Centroid, PipelineError> {
        let ligand = self.ctx.workdir.join(self.frame.ligand_name());
        let centroid = mae::ligand_centroid(&ligand)?;

        self.advance(FrameState::GeometryDerived);
        info!(frame = self.frame.index(), centroid = %centroid, "Ligand centroid derived");
        Ok(centroid)
    }

    /// Writes the grid submission CSV and hands it to the grid generator,
    /// which queues the job and returns before the archive exists.
    async fn generate_grid(
        &mut self,
        centroid: &Centroid,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        self.advance(FrameState::GridGenerating);

        let csv = self.frame.grid_csv_name();
        let contents = grid_submission_csv(&self.frame.receptor_name(), centroid);
        tokio::fs::write(self.ctx.workdir.join(&csv), contents)
            .await
            .map_err(|source| {
                io_error(Stage::GridGenerate, "could not write grid submission", source)
            })?;

        self.ctx
            .stages
            .run(
                Stage::GridGenerate,
                self.ctx.workdir,
                &self.ctx.suite.glide_gridgen(),
                [csv.as_str()],
                cancel,
            )
            .await?;

        Ok(())
    }

    /// Waits for the grid archive to land and copies it under the frame's
    /// own name.
    async fn await_grid(
        &mut self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        self.advance(FrameState::WaitingForGrid);

        let archive = self
            .ctx
            .waiter
            .wait_for_archive(self.ctx.workdir, GRID_ARCHIVE_PATTERN, cancel)
            .await?;

        tokio::fs::copy(&archive, self.ctx.workdir.join(self.frame.grid_zip_name()))
            .await
            .map_err(|source| io_error(Stage::WaitForGrid, "could not copy grid archive", source))?;

        Ok(())
    }

    /// Runs hypothesis generation against the split structures, centered
    /// on the derived centroid. `-WAIT` keeps the command in the
    /// foreground until the job finishes.
    async fn generate_hypothesis(
        &mut self,
        centroid: &Centroid,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        self.advance(FrameState::HypothesisGenerating);

        let params = &self.ctx.config.hypothesis;
        let args = [
            "-WAIT".to_string(),
            "-rec_file".to_string(),
            self.frame.receptor_name(),
            "-lig_file".to_string(),
            self.frame.ligand_name(),
            format!("-site_center={}", centroid),
            "-in_place".to_string(),
            "-fd".to_string(),
            String::new(),
            "-f".to_string(),
            params.max_features.to_string(),
            "-site_dist".to_string(),
            float_arg(params.site_dist),
            "-pair_dist".to_string(),
            float_arg(params.pair_dist),
            "-xvol".to_string(),
            "-scale".to_string(),
            float_arg(params.xvol_scale),
            "-buff".to_string(),
            float_arg(params.buffer),
            "-limit".to_string(),
            float_arg(params.limit),
            "-HOST".to_string(),
            params.host.clone(),
            "-j".to_string(),
            self.frame.hypothesis_job_name(),
        ];

        self.ctx
            .stages
            .run(
                Stage::HypothesisGenerate,
                self.ctx.workdir,
                &self.ctx.suite.epharmacophores(),
                args,
                cancel,
            )
            .await?;

        Ok(())
    }
}

/// Builds the one-row CSV the grid generator consumes. The centroid field
/// carries embedded commas and is therefore quoted; the constraint columns
/// stay empty.
fn grid_submission_csv(receptor: &str, centroid: &Centroid) -> String {
    format!(
        "rec_file,cent_coor,hbond_cons,lig_asl,res_asl\r\n{},\"{}\",,,\r\n",
        receptor, centroid
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const LIGAND_FIXTURE: &str = "\
f_m_ct {
  s_m_title
  :::
  \"frame\"
  m_atom[3] {
    # First column is atom index #
    r_m_x_coord
    r_m_y_coord
    r_m_z_coord
    :::
    1 1.0 2.0 3.0
    2 2.0 4.0 6.0
    3 3.0 6.0 9.0
    :::
  }
}
";

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Builds a suite root whose programs imitate the real tools' file
    /// behavior: prepwizard copies input to the pH-tagged output and
    /// leaves protassign scratch behind, pv_convert copies the prepared
    /// file to the requested output, the grid generator drops a gridgen
    /// archive, and epharmacophores writes `<job>.phypo`.
    #[cfg(unix)]
    fn fake_suite(root: &Path) -> SchrodingerSuite {
        let utilities = root.join("utilities");
        fs::create_dir_all(&utilities).unwrap();

        write_script(
            &utilities.join("prepwizard"),
            "cp \"$1\" \"$2\"\ntouch \"${1%.mae}-protassign.log\"",
        );
        write_script(&root.join("run"), "cp \"$4\" \"$6\"");
        write_script(
            &utilities.join("generate_glide_grids"),
            "touch glide-gridgen.zip",
        );
        write_script(
            &utilities.join("epharmacophores"),
            "for arg; do job=\"$arg\"; done\ntouch \"$job.phypo\"",
        );
        write_script(&root.join("jobcontrol"), "exit 0");

        SchrodingerSuite::new(root).unwrap()
    }

    fn test_config() -> RunConfig {
        RunConfig::new()
            .with_nice_level(0)
            .with_poll_interval(std::time::Duration::from_millis(10))
            .with_grid_timeout(std::time::Duration::from_secs(5))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_happy_path_produces_hypothesis() {
        let temp = TempDir::new().unwrap();
        let suite = fake_suite(&temp.path().join("suite"));
        let workdir = temp.path().join("work");
        fs::create_dir(&workdir).unwrap();
        let source = temp.path().join("5.mae");
        fs::write(&source, LIGAND_FIXTURE).unwrap();

        let config = test_config();
        let stages = StageRunner::new(config.nice_level);
        let waiter = ArtifactWaiter::new(config.poll_interval, config.grid_timeout);
        let ctx = PipelineContext {
            suite: &suite,
            stages: &stages,
            waiter: &waiter,
            config: &config,
            workdir: &workdir,
        };

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = FramePipeline::new(Frame::new(5, &source), ctx)
            .run(cancel_rx)
            .await;

        assert!(report.succeeded(), "report: {:?}", report);
        assert_eq!(report.artifact, Some(workdir.join("5_hypo.phypo")));
        assert!(workdir.join("5_hypo.phypo").exists());

        // Intermediate artifacts, in stage order.
        assert!(workdir.join("5_prepared.mae").exists());
        assert!(!workdir.join("5-protassign.log").exists());
        assert!(workdir.join("5_prepared-out_lig.mae").exists());
        assert!(workdir.join("5_prepared-out_recep.mae").exists());
        assert!(workdir.join("5_grid.zip").exists());

        let csv = fs::read_to_string(workdir.join("5_grid_input.csv")).unwrap();
        assert_eq!(
            csv,
            "rec_file,cent_coor,hbond_cons,lig_asl,res_asl\r\n5_prepared-out_recep.mae,\"2.00,4.00,6.00\",,,\r\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stuck_scratch_file_does_not_fail_the_frame() {
        let temp = TempDir::new().unwrap();
        let suite = fake_suite(&temp.path().join("suite"));
        // PrepWizard stand-in whose protassign leftover is an occupied
        // directory, so remove_file cannot clear it.
        write_script(
            &temp.path().join("suite/utilities/prepwizard"),
            "cp \"$1\" \"$2\"\nmkdir \"${1%.mae}-protassign.log\"\ntouch \"${1%.mae}-protassign.log/keep\"",
        );
        let workdir = temp.path().join("work");
        fs::create_dir(&workdir).unwrap();
        let source = temp.path().join("4.mae");
        fs::write(&source, LIGAND_FIXTURE).unwrap();

        let config = test_config();
        let stages = StageRunner::new(config.nice_level);
        let waiter = ArtifactWaiter::new(config.poll_interval, config.grid_timeout);
        let ctx = PipelineContext {
            suite: &suite,
            stages: &stages,
            waiter: &waiter,
            config: &config,
            workdir: &workdir,
        };

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = FramePipeline::new(Frame::new(4, &source), ctx)
            .run(cancel_rx)
            .await;

        assert!(report.succeeded(), "report: {:?}", report);
        assert!(workdir.join("4_hypo.phypo").exists());
        // The stuck leftover stays behind without blocking the frame.
        assert!(workdir.join("4-protassign.log").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prepare_failure_short_circuits() {
        let temp = TempDir::new().unwrap();
        let suite = fake_suite(&temp.path().join("suite"));
        write_script(
            &temp.path().join("suite/utilities/prepwizard"),
            "echo bad structure >&2\nexit 2",
        );
        let workdir = temp.path().join("work");
        fs::create_dir(&workdir).unwrap();
        let source = temp.path().join("9.mae");
        fs::write(&source, LIGAND_FIXTURE).unwrap();

        let config = test_config();
        let stages = StageRunner::new(config.nice_level);
        let waiter = ArtifactWaiter::new(config.poll_interval, config.grid_timeout);
        let ctx = PipelineContext {
            suite: &suite,
            stages: &stages,
            waiter: &waiter,
            config: &config,
            workdir: &workdir,
        };

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = FramePipeline::new(Frame::new(9, &source), ctx)
            .run(cancel_rx)
            .await;

        assert!(!report.succeeded());
        assert_eq!(report.failed_stage.as_deref(), Some("prepare"));
        assert!(report.error.unwrap().contains("bad structure"));

        // Nothing after the failing stage ran.
        assert!(!workdir.join("9_prepared-out_lig.mae").exists());
        assert!(!workdir.join("9_grid_input.csv").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_atomless_ligand_fails_geometry_stage() {
        let temp = TempDir::new().unwrap();
        let suite = fake_suite(&temp.path().join("suite"));
        // pv_convert stand-in that emits a structure with no atom block.
        write_script(
            &temp.path().join("suite/run"),
            "printf 'f_m_ct {\\n  :::\\n}\\n' > \"$6\"",
        );
        let workdir = temp.path().join("work");
        fs::create_dir(&workdir).unwrap();
        let source = temp.path().join("2.mae");
        fs::write(&source, LIGAND_FIXTURE).unwrap();

        let config = test_config();
        let stages = StageRunner::new(config.nice_level);
        let waiter = ArtifactWaiter::new(config.poll_interval, config.grid_timeout);
        let ctx = PipelineContext {
            suite: &suite,
            stages: &stages,
            waiter: &waiter,
            config: &config,
            workdir: &workdir,
        };

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = FramePipeline::new(Frame::new(2, &source), ctx)
            .run(cancel_rx)
            .await;

        assert!(!report.succeeded());
        assert_eq!(report.failed_stage.as_deref(), Some("geometry-derive"));
        assert!(!workdir.join("2_grid_input.csv").exists());
    }

    #[test]
    fn test_grid_submission_csv_quotes_centroid() {
        let centroid = Centroid {
            x: 10.0,
            y: -2.5,
            z: 3.333,
        };
        let csv = grid_submission_csv("4_prepared-out_recep.mae", &centroid);
        assert_eq!(
            csv,
            "rec_file,cent_coor,hbond_cons,lig_asl,res_asl\r\n4_prepared-out_recep.mae,\"10.00,-2.50,3.33\",,,\r\n"
        );
    }
}
