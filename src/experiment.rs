//! Experiment definition: the set of flows to launch.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::exec::Executor;
use crate::flow::{Bandwidth, Flow};
use crate::options::{UdpFlowArgs, build_tls_options, build_udp_options};
use crate::protocol::Tool;
use crate::runner::OpensslRunner;
use crate::session::SessionManager;
use crate::topology::TopologyMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    #[serde(default)]
    flows: Vec<Flow>,
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flows: Vec::new(),
        }
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn add_flow(&mut self, flow: Flow) -> &Flow {
        debug!(
            experiment = %self.name,
            src = %flow.source_ns,
            dst = %flow.destination_ns,
            "flow added"
        );
        self.flows.push(flow);
        &self.flows[self.flows.len() - 1]
    }

    /// Add a UDP flow, or a DTLS flow when `args.enable_dtls` is set.
    pub fn add_udp_flow(&mut self, flow: Flow, args: UdpFlowArgs) -> &Flow {
        self.add_udp_flow_with_rng(flow, args, &mut rand::rng())
    }

    /// [`Self::add_udp_flow`] with a caller-supplied RNG for port assignment.
    pub fn add_udp_flow_with_rng<R: Rng>(
        &mut self,
        mut flow: Flow,
        args: UdpFlowArgs,
        rng: &mut R,
    ) -> &Flow {
        let (options, coercion) = build_udp_options(&args, rng);
        if let Some(coercion) = coercion {
            warn!(
                "{} will not generate DTLS flow. For DTLS, please use 'openssl' tool.",
                coercion.requested
            );
        }
        flow.options = options;
        self.add_flow(flow)
    }

    /// Add a TLS flow carried by `openssl`.
    pub fn add_tls_flow(&mut self, mut flow: Flow, target_bandwidth: &Bandwidth) -> &Flow {
        flow.options = build_tls_options(target_bandwidth);
        self.add_flow(flow)
    }

    /// Runners for every TLS or DTLS flow carried by `openssl`, in flow
    /// order.
    pub fn openssl_runners<E: Executor>(
        &self,
        topology: &Arc<TopologyMap>,
        sessions: &Arc<SessionManager<E>>,
    ) -> Result<Vec<OpensslRunner<E>>> {
        let mut runners = Vec::new();
        for flow in &self.flows {
            let secure = flow.options.protocol().and_then(|p| p.secure()).is_some();
            if !secure || flow.options.tool() != Some(Tool::Openssl) {
                continue;
            }
            runners.push(OpensslRunner::from_flow(
                flow,
                Arc::clone(topology),
                Arc::clone(sessions),
            )?);
        }
        Ok(runners)
    }
}
