// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use std::sync::Arc;

use home_sensors_common::{DataLocation, Reading, UploadPayload};

pub fn create_router(location: DataLocation) -> Router {
    Router::new()
        .route("/data", post(data_handler))
        .with_state(Arc::new(location))
}

/// Files one uploaded reading; anything but `200 OK` makes the client retry later.
async fn data_handler(
    State(location): State<Arc<DataLocation>>,
    Json(payload): Json<UploadPayload>,
) -> (StatusCode, String) {
    let reading = match Reading::try_from(payload) {
        Ok(reading) => reading,
        Err(e) => {
            log::warn!("Rejected reading with a bad date_time: {e}");
            return (StatusCode::UNPROCESSABLE_ENTITY, format!("Bad date_time: {e}"));
        }
    };

    let stamp = format!("{} {}", reading.location, reading.iso_time_string());
    match tokio::task::spawn_blocking(move || location.record(&reading)).await {
        Ok(Ok(path)) => {
            log::info!("Received {stamp} into {}", path.display());
            (StatusCode::OK, "OK".into())
        }
        Ok(Err(e)) => {
            log::error!("Cannot store {stamp}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            log::error!("Store task for {stamp} failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Store task failed".into())
        }
    }
}
