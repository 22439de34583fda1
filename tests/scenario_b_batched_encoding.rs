//! A chunking encoder forces multiple async writes, and handlers still fire
//! in submission order.

mod support;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use parcel_port::{ParcelPort, PortConfig};
use support::{locality, ChunkEncoder, RecordingHandler, ScenarioParcel};

#[tokio::test]
async fn ten_parcels_through_a_three_per_call_encoder_need_four_writes_in_order() {
	let config = PortConfig::default();
	let encoder = ChunkEncoder::new(3);
	let calls = encoder.call_counter();
	let port = ParcelPort::new(RecordingHandler::new(0), encoder, config);
	port.run();

	let dest = locality(3200);
	let order = Arc::new(Mutex::new(Vec::new()));
	let parcels: Vec<ScenarioParcel> = (0..10u32).map(|i| ScenarioParcel::new(dest.clone(), vec![i as u8])).collect();
	let handlers = (0..10u32)
		.map(|i| {
			let order = order.clone();
			Box::new(move |result: Result<(), parcel_port::PortError>, _parcel: ScenarioParcel| {
				assert!(result.is_ok());
				order.lock().unwrap().push(i);
			}) as parcel_port::WriteHandler<ScenarioParcel>
		})
		.collect();

	port.put_parcels(dest, parcels, handlers).unwrap();
	port.flush_parcels().await;

	assert_eq!(*order.lock().unwrap(), (0..10u32).collect::<Vec<_>>());
	assert_eq!(calls.load(Ordering::SeqCst), 4);
}
