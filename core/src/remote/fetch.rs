use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;

use kernelscout_protocol::ConnectionId;
use kernelscout_protocol::InterpreterInfo;
use kernelscout_protocol::KernelConnection;
use kernelscout_protocol::KernelSpecModel;
use kernelscout_protocol::LiveSessionConnection;
use kernelscout_protocol::LiveSessionModel;
use kernelscout_protocol::PYTHON_LANGUAGE;
use kernelscout_protocol::RemoteSpecConnection;
use kernelscout_protocol::RunningKernelModel;
use kernelscout_protocol::SessionModel;
use tokio::try_join;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::RemoteKernelFinder;
use crate::capabilities::ServerConnectionInfo;
use crate::error::Result;
use crate::error::ScoutError;

impl RemoteKernelFinder {
    /// One pass against the live server: running kernels, kernel specs,
    /// and sessions are requested concurrently over a single
    /// session-manager connection, which is disposed on every path.
    pub(crate) async fn fetch_live(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<KernelConnection>> {
        let handle = self
            .shared
            .sessions
            .connect(&self.server)
            .await
            .map_err(|err| ScoutError::transient_fetch(self.server.server_id.clone(), err))?;

        let fetched = try_join!(
            handle.running_kernels(),
            handle.kernel_specs(),
            handle.running_sessions(),
        );
        handle.dispose().await;
        let (kernels, specs, sessions) = fetched
            .map_err(|err| ScoutError::transient_fetch(self.server.server_id.clone(), err))?;

        if token.is_cancelled() {
            return Err(ScoutError::Cancelled);
        }
        let interpreters = self.resolve_spec_interpreters(&specs, token).await?;
        let excluded = self.shared.exclusions.snapshot().await;
        Ok(merge_candidates(
            &self.server,
            specs,
            sessions,
            kernels,
            interpreters,
            &excluded,
        ))
    }

    /// Interpreter details for Python specs, resolvable only when the
    /// server runs on this machine. A failed lookup drops the enrichment
    /// for that spec, never the spec itself.
    async fn resolve_spec_interpreters(
        &self,
        specs: &[KernelSpecModel],
        token: &CancellationToken,
    ) -> Result<HashMap<String, InterpreterInfo>> {
        let mut resolved = HashMap::new();
        let Some(lookup) = self.shared.interpreters.as_ref() else {
            return Ok(resolved);
        };
        if !self.server.is_local_host() {
            return Ok(resolved);
        }
        for spec in specs {
            if token.is_cancelled() {
                return Err(ScoutError::Cancelled);
            }
            let is_python = spec
                .language
                .as_deref()
                .is_some_and(|language| language.eq_ignore_ascii_case(PYTHON_LANGUAGE));
            if !is_python {
                continue;
            }
            let Some(executable) = spec.argv.first() else {
                continue;
            };
            match lookup.resolve(Path::new(executable)).await {
                Ok(info) => {
                    resolved.insert(spec.name.clone(), info);
                }
                Err(err) => {
                    debug!(
                        "interpreter resolution for kernel spec {} failed: {err:#}",
                        spec.name
                    );
                }
            }
        }
        Ok(resolved)
    }
}

/// Builds the candidate list out of the three raw server responses.
///
/// Sessions are matched to specs by spec name and to runtime kernels by
/// kernel id; a missing match leaves the corresponding piece at its empty
/// default. Sessions in the exclusion set are dropped entirely.
fn merge_candidates(
    server: &ServerConnectionInfo,
    specs: Vec<KernelSpecModel>,
    sessions: Vec<SessionModel>,
    kernels: Vec<RunningKernelModel>,
    interpreters: HashMap<String, InterpreterInfo>,
    excluded: &HashSet<String>,
) -> Vec<KernelConnection> {
    let mut candidates = Vec::with_capacity(specs.len() + sessions.len());

    for spec in &specs {
        let id = ConnectionId::new(format!("{}.{}", server.server_id, spec.name));
        candidates.push(KernelConnection::RemoteSpec(RemoteSpecConnection {
            id,
            server_id: server.server_id.clone(),
            base_url: server.base_url.clone(),
            interpreter: interpreters.get(&spec.name).cloned(),
            spec: spec.clone(),
        }));
    }

    for session in sessions {
        let stub = session.kernel.clone().unwrap_or_default();
        if excluded.contains(&stub.id) || excluded.contains(&session.id) {
            continue;
        }
        let spec = specs
            .iter()
            .find(|spec| !stub.name.is_empty() && spec.name == stub.name)
            .cloned()
            .unwrap_or_default();
        let runtime_id = if stub.id.is_empty() {
            session.id.clone()
        } else {
            stub.id.clone()
        };
        let kernel = kernels
            .iter()
            .find(|kernel| !stub.id.is_empty() && kernel.id == stub.id)
            .cloned()
            .unwrap_or(stub);
        let id = ConnectionId::new(format!("{}.{runtime_id}", server.server_id));
        candidates.push(KernelConnection::LiveRemoteSession(LiveSessionConnection {
            id,
            server_id: server.server_id.clone(),
            base_url: server.base_url.clone(),
            session: LiveSessionModel {
                session_id: session.id,
                session_name: session.name,
                session_path: session.path,
                kernel,
                spec,
            },
        }));
    }

    candidates
}
