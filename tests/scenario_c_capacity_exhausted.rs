//! A cache with zero capacity can never grant a connection; `stop` must
//! still resolve every pending parcel, with [`PortError::ShutdownError`]
//! and no writes ever issued.

mod support;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use parcel_port::{ParcelPort, PortConfig, PortError};
use support::{locality, ChunkEncoder, RecordingHandler, ScenarioParcel};

#[tokio::test]
async fn stop_resolves_unreachable_parcels_with_shutdown_error() {
	let mut config = PortConfig::default();
	config.max_connections = 0;

	let encoder = ChunkEncoder::new(10);
	let handler = RecordingHandler::new(0);
	let delivered = handler.delivered.clone();
	let port = ParcelPort::new(handler, encoder, config);
	port.run();

	let dest = locality(3300);
	let results = Arc::new(Mutex::new(Vec::new()));
	for i in 0..5u32 {
		let results = results.clone();
		port.put_parcel(
			dest.clone(),
			ScenarioParcel::new(dest.clone(), vec![i as u8]),
			Box::new(move |result, _parcel| {
				results.lock().unwrap().push(result);
			}),
		)
		.unwrap();
	}

	port.stop(true).await;

	let results = results.lock().unwrap();
	assert_eq!(results.len(), 5);
	assert!(results.iter().all(|r| matches!(r, Err(PortError::ShutdownError))));
	assert!(delivered.lock().unwrap().is_empty());
}
