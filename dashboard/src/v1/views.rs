use serde::Serialize;
use shared::sheets::calls::EmergencyCall;
use shared::sheets::duty::DutyEvent;
use shared::sheets::vehicles::{VehicleKind, VehicleRecord};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleView {
    #[serde(flatten)]
    pub vehicle: VehicleRecord,
    pub status_code: Option<u8>,
    pub kind: VehicleKind,
    pub radio_name: String,
}

impl VehicleView {
    pub fn new(vehicle: &VehicleRecord, radio_prefix: &str) -> Self {
        Self {
            status_code: vehicle.status_code(),
            kind: vehicle.kind(),
            radio_name: vehicle.radio_name(radio_prefix),
            vehicle: vehicle.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyEventView {
    #[serde(flatten)]
    pub event: DutyEvent,
    /// The event is running right now.
    pub current: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallView {
    #[serde(flatten)]
    pub call: EmergencyCall,
    pub vehicle_list: Vec<String>,
    /// Tells clients to hide the location, which is still sent.
    pub completed: bool,
}

impl From<EmergencyCall> for CallView {
    fn from(call: EmergencyCall) -> Self {
        Self {
            vehicle_list: call.vehicle_list().into_iter().map(ToString::to_string).collect(),
            completed: call.is_completed(),
            call,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::sheets::calls::CallStatus;

    #[test]
    fn completed_calls_keep_their_location() {
        let view = CallView::from(EmergencyCall {
            call_type: "TH1".into(),
            description: "Ölspur".into(),
            time: "08:15".into(),
            location: "Feldweg 3".into(),
            vehicles: "HLF, MTW".into(),
            start_time: String::new(),
            status: CallStatus::Completed,
        });

        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["location"], json!("Feldweg 3"));
        assert_eq!(value["completed"], json!(true));
        assert_eq!(value["vehicleList"], json!(["HLF", "MTW"]));
    }
}
