use aprescore::instrument::{BurstKind, RadarConfig};
use aprescore::transport::http::API_KEY_HEADER;
use log::warn;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::instrument::{Instrument, ResultPoll};

pub type SharedInstrument = Arc<Mutex<Instrument>>;

#[derive(Debug, Deserialize)]
struct ResultsQuery {
    kind: BurstKind,
}

fn message(status: StatusCode, text: &str) -> Response {
    warp::reply::with_status(warp::reply::json(&json!({ "message": text })), status).into_response()
}

/// Runs `handler` against the instrument once the API key checks out.
fn respond<F>(state: &SharedInstrument, key: Option<String>, handler: F) -> Response
where
    F: FnOnce(&mut Instrument) -> Response,
{
    let Ok(mut instrument) = state.lock() else {
        return message(StatusCode::INTERNAL_SERVER_ERROR, "instrument state poisoned");
    };
    if !instrument.accepts(key.as_deref()) {
        warn!("request with invalid API key refused");
        return message(StatusCode::UNAUTHORIZED, "invalid API key");
    }
    handler(&mut instrument)
}

fn with_state(
    state: SharedInstrument,
) -> impl Filter<Extract = (SharedInstrument,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn api_key() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>(API_KEY_HEADER)
}

fn trigger(instrument: &mut Instrument, kind: BurstKind) -> Response {
    match instrument.trigger(kind, Instant::now()) {
        Ok(()) => message(StatusCode::ACCEPTED, "burst started"),
        Err(running) => message(
            StatusCode::CONFLICT,
            &format!("{running} burst already in progress"),
        ),
    }
}

/// HTTP surface of the emulated instrument.
pub fn routes(
    state: SharedInstrument,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let status = warp::path!("api" / "system" / "housekeeping" / "status")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(api_key())
        .map(|state: SharedInstrument, key: Option<String>| {
            respond(&state, key, |instrument| {
                warp::reply::json(&instrument.status()).into_response()
            })
        });

    let get_config = warp::path!("api" / "radar" / "config")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(api_key())
        .map(|state: SharedInstrument, key: Option<String>| {
            respond(&state, key, |instrument| {
                warp::reply::json(&instrument.radar_config()).into_response()
            })
        });

    let set_config = warp::path!("api" / "radar" / "config")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(api_key())
        .and(warp::body::json())
        .map(
            |state: SharedInstrument, key: Option<String>, candidate: RadarConfig| {
                respond(&state, key, |instrument| {
                    match instrument.set_radar_config(candidate) {
                        Ok(stored) => warp::reply::json(&stored).into_response(),
                        Err(reason) => message(StatusCode::UNPROCESSABLE_ENTITY, &reason),
                    }
                })
            },
        );

    let trial_burst = warp::path!("api" / "radar" / "trial-burst")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(api_key())
        .map(|state: SharedInstrument, key: Option<String>| {
            respond(&state, key, |instrument| trigger(instrument, BurstKind::Trial))
        });

    let burst = warp::path!("api" / "radar" / "burst")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(api_key())
        .map(|state: SharedInstrument, key: Option<String>| {
            respond(&state, key, |instrument| {
                trigger(instrument, BurstKind::Persisted)
            })
        });

    let results = warp::path!("api" / "radar" / "results")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(api_key())
        .and(warp::query::<ResultsQuery>())
        .map(
            |state: SharedInstrument, key: Option<String>, query: ResultsQuery| {
                respond(&state, key, |instrument| {
                    match instrument.poll_result(query.kind, Instant::now()) {
                        ResultPoll::Ready(result) => warp::reply::json(&result).into_response(),
                        ResultPoll::Pending => message(StatusCode::ACCEPTED, "burst in progress"),
                        ResultPoll::NeverTriggered => message(
                            StatusCode::CONFLICT,
                            &format!("no {} burst has been triggered", query.kind),
                        ),
                    }
                })
            },
        );

    let download = warp::path!("api" / "data" / "download" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(api_key())
        .map(|name: String, state: SharedInstrument, key: Option<String>| {
            respond(&state, key, |instrument| match instrument.file(&name) {
                Some(bytes) => {
                    warp::reply::with_header(bytes, "content-type", "application/octet-stream")
                        .into_response()
                }
                None => message(StatusCode::NOT_FOUND, &format!("{name} not found")),
            })
        });

    let get_config_file = warp::path!("api" / "system" / "housekeeping" / "config")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(api_key())
        .map(|state: SharedInstrument, key: Option<String>| {
            respond(&state, key, |instrument| {
                instrument.config_ini().into_response()
            })
        });

    let set_config_file = warp::path!("api" / "system" / "housekeeping" / "config")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(api_key())
        .and(warp::body::bytes())
        .map(
            |state: SharedInstrument, key: Option<String>, body: warp::hyper::body::Bytes| {
                respond(&state, key, |instrument| {
                    match String::from_utf8(body.to_vec()) {
                        Ok(contents) => {
                            instrument.upload_config_ini(contents);
                            message(StatusCode::OK, "config.ini stored; reset to apply")
                        }
                        Err(_) => message(StatusCode::BAD_REQUEST, "config.ini must be text"),
                    }
                })
            },
        );

    let reset = warp::path!("api" / "system" / "reset")
        .and(warp::post())
        .and(with_state(state))
        .and(api_key())
        .map(|state: SharedInstrument, key: Option<String>| {
            respond(&state, key, |instrument| {
                warp::reply::json(&instrument.reset()).into_response()
            })
        });

    status
        .or(get_config)
        .unify()
        .or(set_config)
        .unify()
        .or(trial_burst)
        .unify()
        .or(burst)
        .unify()
        .or(results)
        .unify()
        .or(download)
        .unify()
        .or(get_config_file)
        .unify()
        .or(set_config_file)
        .unify()
        .or(reset)
        .unify()
}
