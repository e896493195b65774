use crate::generator::scenario::GeneratorConfig;
use crate::status_bridge::model::StatusModel;
use crate::workflow::runner::Runner;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock},
    thread,
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter, Rejection, Reply};

type SharedModel = Arc<RwLock<StatusModel>>;

#[derive(Debug)]
struct RunFailed;

impl warp::reject::Reject for RunFailed {}

/// `GET /status`, `GET /tracks` and `POST /ingest-config` over the shared
/// model.
pub fn routes(
    state: SharedModel,
    runner: Arc<Runner>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());
    let runner_filter = warp::any().map(move || runner.clone());

    let status_route = warp::path("status")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedModel| {
            let model = state.read().unwrap_or_else(PoisonError::into_inner);
            let body = json!({
                "scenario": model.scenario,
                "pri_count": model.pri_count,
                "point_count": model.point_count,
                "confirmed_tracks": model.confirmed_tracks,
                "stages": model.stages,
            });
            warp::reply::json(&body)
        });

    let tracks_route = warp::path("tracks")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedModel| {
            let model = state.read().unwrap_or_else(PoisonError::into_inner);
            let body = json!({
                "track_reports": model.track_reports,
                "initiations": model.initiations,
            });
            warp::reply::json(&body)
        });

    let scenario_route = warp::path("ingest-config")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter)
        .and(runner_filter)
        .and_then(
            |config: GeneratorConfig, state: SharedModel, runner: Arc<Runner>| async move {
                match runner.execute_scenario(&config) {
                    Ok(result) => {
                        let model = StatusModel::from(result);
                        let reply = json!({
                            "status": "ok",
                            "points": model.point_count,
                            "confirmed_tracks": model.confirmed_tracks,
                            "description": config.description.clone().unwrap_or_default(),
                        });
                        if let Some(name) = config.scenario.as_ref() {
                            log::info!(
                                "[bridge] scenario {} -> {} confirmed tracks",
                                name,
                                model.confirmed_tracks
                            );
                        }
                        *state.write().unwrap_or_else(PoisonError::into_inner) = model;
                        Ok::<_, Rejection>(warp::reply::with_status(
                            warp::reply::json(&reply),
                            StatusCode::OK,
                        ))
                    }
                    Err(err) => {
                        log::error!("[bridge] ingest-config failed: {err:#}");
                        Err(warp::reject::custom(RunFailed))
                    }
                }
            },
        );

    status_route.or(tracks_route).or(scenario_route)
}

/// Read-only HTTP view of the latest run.
pub struct StatusBridge {
    state: SharedModel,
    runner: Arc<Runner>,
}

impl StatusBridge {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            state: Arc::new(RwLock::new(StatusModel::default())),
            runner,
        }
    }

    /// Serves the routes from a background thread with its own runtime.
    pub fn serve(&self, address: SocketAddr) -> thread::JoinHandle<()> {
        let api = routes(self.state.clone(), self.runner.clone());
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("[bridge] failed to build runtime: {err}");
                    return;
                }
            };
            runtime.block_on(async move {
                match warp::serve(api).try_bind_ephemeral(address) {
                    Ok((bound, server)) => {
                        log::info!("[bridge] listening on http://{bound}");
                        server.await;
                    }
                    Err(err) => log::error!("[bridge] cannot bind {address}: {err}"),
                }
            });
        })
    }

    pub fn publish(&self, model: StatusModel) {
        log::info!(
            "[bridge] {} PRIs, {} points, {} confirmed tracks",
            model.pri_count,
            model.point_count,
            model.confirmed_tracks
        );
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = model;
    }

    pub fn publish_status(&self, message: &str) {
        log::info!("[bridge] {}", message);
    }

    #[cfg(test)]
    fn snapshot(&self) -> StatusModel {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    fn api(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        routes(self.state.clone(), self.runner.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::WorkflowConfig;

    fn bridge() -> StatusBridge {
        let cfg = WorkflowConfig::from_args(1, 64, 64, 0);
        StatusBridge::new(Arc::new(Runner::new(cfg)))
    }

    #[test]
    fn publish_updates_snapshot() {
        let bridge = bridge();
        bridge.publish(StatusModel {
            pri_count: 7,
            ..Default::default()
        });
        assert_eq!(bridge.snapshot().pri_count, 7);
    }

    #[tokio::test]
    async fn status_route_serves_published_model() {
        let bridge = bridge();
        bridge.publish(StatusModel {
            pri_count: 42,
            scenario: Some("replay".into()),
            ..Default::default()
        });
        let response = warp::test::request()
            .method("GET")
            .path("/status")
            .reply(&bridge.api())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["pri_count"], 42);
        assert_eq!(body["scenario"], "replay");
    }

    #[tokio::test]
    async fn ingest_config_runs_a_scenario() {
        let bridge = bridge();
        let scenario = GeneratorConfig {
            azimuth_count: 64,
            gate_count: 64,
            scans: 2,
            targets: Vec::new(),
            ..Default::default()
        };
        let response = warp::test::request()
            .method("POST")
            .path("/ingest-config")
            .json(&scenario)
            .reply(&bridge.api())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(bridge.snapshot().pri_count, 128);

        let tracks = warp::test::request()
            .method("GET")
            .path("/tracks")
            .reply(&bridge.api())
            .await;
        let body: serde_json::Value = serde_json::from_slice(tracks.body()).unwrap();
        assert_eq!(body["track_reports"].as_array().map(Vec::len), Some(0));
    }
}
