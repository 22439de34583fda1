//! A failed in-flight write discards its connection and retries the same
//! destination once pending work remains.

mod support;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use parcel_port::{ParcelPort, PortConfig, PortError};
use support::{locality, ChunkEncoder, RecordingHandler, ScenarioParcel};

#[tokio::test]
async fn a_failed_write_is_discarded_and_the_destination_is_retried() {
	let mut config = PortConfig::default();
	config.max_connections = 8;
	config.max_connections_per_locality = 1;

	let encoder = ChunkEncoder::new(10);
	// The first connection ever created for this destination fails its
	// write; every connection after that succeeds.
	let handler = RecordingHandler::new(1);
	let port = ParcelPort::new(handler, encoder, config);
	port.run();

	let dest = locality(3400);
	let result_a = Arc::new(Mutex::new(None));
	let result_b = Arc::new(Mutex::new(None));

	{
		let result_a = result_a.clone();
		port.put_parcel(
			dest.clone(),
			ScenarioParcel::new(dest.clone(), vec![1]),
			Box::new(move |result, _parcel| *result_a.lock().unwrap() = Some(result)),
		)
		.unwrap();
	}
	{
		let result_b = result_b.clone();
		port.put_parcel(
			dest.clone(),
			ScenarioParcel::new(dest.clone(), vec![2]),
			Box::new(move |result, _parcel| *result_b.lock().unwrap() = Some(result)),
		)
		.unwrap();
	}

	port.flush_parcels().await;

	assert!(matches!(result_a.lock().unwrap().take(), Some(Err(PortError::NetworkError(_)))));
	assert!(matches!(result_b.lock().unwrap().take(), Some(Ok(()))));
}
