//! Worker loop.

use pwa_core::PwaError;
use pwa_like::{FcnEvaluator, LikelihoodEvaluator};
use tracing::info;

use crate::endpoint::Endpoint;
use crate::message::{unexpected, Message};

/// Serves the master over `endpoint` until it sends `Terminate(true)`.
///
/// `load` receives the master's highest parameter id and returns this
/// worker's (unloaded) datasets. Returns the number of calls served.
pub fn run_worker<F>(rank: usize, endpoint: &mut dyn Endpoint, load: F) -> Result<usize, PwaError>
where
    F: FnOnce(u32) -> Result<LikelihoodEvaluator, PwaError>,
{
    let max_param_id = match endpoint.recv()? {
        Message::MaxParamId(max) => max,
        other => return Err(unexpected("max-param-id", &other)),
    };
    let mut evaluator = load(max_param_id)?;
    let reports = evaluator.load_for_fit()?;
    endpoint.send(&Message::SetupMessage(format!(
        "rank {rank}: {}",
        reports.join("; ")
    )))?;
    info!(rank, datasets = reports.len(), "worker set up");

    let mut calls = 0;
    loop {
        match endpoint.recv()? {
            Message::Terminate(true) => break,
            Message::Terminate(false) => {}
            other => return Err(unexpected("terminate", &other)),
        }
        let flag = match endpoint.recv()? {
            Message::FcnFlag(flag) => flag,
            other => return Err(unexpected("fcn-flag", &other)),
        };
        let params = match endpoint.recv()? {
            Message::Params(params) => params,
            other => return Err(unexpected("params", &other)),
        };
        let mut derivs = vec![0.0; if flag.wants_gradient() { params.len() } else { 0 }];
        let value = evaluator.evaluate(
            flag,
            &params,
            flag.wants_gradient().then_some(&mut derivs[..]),
        )?;
        endpoint.send(&Message::FcnVal(value))?;
        if flag.wants_gradient() {
            endpoint.send(&Message::Derivs(derivs))?;
        }
        calls += 1;
    }
    info!(rank, calls, "worker exiting");
    Ok(calls)
}
