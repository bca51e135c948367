//! Master side of the distributed objective.

use pwa_core::{ErrorInfo, FcnFlag, PwaError};
use pwa_like::{FcnEvaluator, LikelihoodEvaluator};
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::message::{unexpected, Message};

/// Evaluates the objective over the master's own datasets plus those of every
/// connected worker. With no workers it degenerates to the local evaluator.
pub struct DistributedEvaluator {
    local: LikelihoodEvaluator,
    workers: Vec<Box<dyn Endpoint>>,
    terminated: bool,
}

impl DistributedEvaluator {
    /// Creates the master from its own datasets and one endpoint per worker,
    /// in rank order.
    pub fn new(local: LikelihoodEvaluator, workers: Vec<Box<dyn Endpoint>>) -> Self {
        Self {
            local,
            workers,
            terminated: false,
        }
    }

    /// Number of workers.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Datasets evaluated on the master.
    pub fn local(&self) -> &LikelihoodEvaluator {
        &self.local
    }

    /// Mutable access to the master's datasets.
    pub fn local_mut(&mut self) -> &mut LikelihoodEvaluator {
        &mut self.local
    }

    /// Setup handshake: every worker receives `max_param_id`, loads its
    /// datasets and answers with a setup report. The master loads its own
    /// datasets in between. Returns all reports, master first.
    pub fn setup(&mut self, max_param_id: u32) -> Result<Vec<String>, PwaError> {
        for worker in &mut self.workers {
            worker.send(&Message::MaxParamId(max_param_id))?;
        }
        let mut reports = self.local.load_for_fit()?;
        for (rank, worker) in self.workers.iter_mut().enumerate() {
            match worker.recv()? {
                Message::SetupMessage(report) => {
                    info!(rank = rank + 1, report = %report, "worker ready");
                    reports.push(report);
                }
                other => return Err(unexpected("setup-message", &other)),
            }
        }
        Ok(reports)
    }

    /// Ends every worker loop. Sends `Terminate(true)` only once.
    pub fn terminate(&mut self) -> Result<(), PwaError> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        for worker in &mut self.workers {
            worker.send(&Message::Terminate(true))?;
        }
        info!(workers = self.workers.len(), "workers terminated");
        Ok(())
    }

    fn broadcast(&mut self, flag: FcnFlag, params: &[f64]) -> Result<(), PwaError> {
        let params = Message::Params(params.to_vec());
        for worker in &mut self.workers {
            worker.send(&Message::Terminate(false))?;
            worker.send(&Message::FcnFlag(flag))?;
            worker.send(&params)?;
        }
        Ok(())
    }
}

impl FcnEvaluator for DistributedEvaluator {
    fn evaluate(
        &mut self,
        flag: FcnFlag,
        params: &[f64],
        mut derivs: Option<&mut [f64]>,
    ) -> Result<f64, PwaError> {
        if self.terminated {
            return Err(PwaError::Protocol(ErrorInfo::new(
                "terminated",
                "workers were already terminated",
            )));
        }
        self.broadcast(flag, params)?;
        let mut total = self.local.evaluate(flag, params, derivs.as_deref_mut())?;
        for worker in &mut self.workers {
            match worker.recv()? {
                Message::FcnVal(value) => total += value,
                other => return Err(unexpected("fcn-val", &other)),
            }
        }
        if flag.wants_gradient() {
            for worker in &mut self.workers {
                let share = match worker.recv()? {
                    Message::Derivs(share) => share,
                    other => return Err(unexpected("derivs", &other)),
                };
                if let Some(out) = derivs.as_deref_mut() {
                    for (slot, d) in out.iter_mut().zip(&share) {
                        *slot += d;
                    }
                }
            }
        }
        debug!(flag = flag.code(), fcn = total, "objective call");
        Ok(total)
    }
}

impl Drop for DistributedEvaluator {
    fn drop(&mut self) {
        if let Err(err) = self.terminate() {
            warn!(error = %err, "failed to terminate workers");
        }
    }
}
