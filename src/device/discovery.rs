use crate::serial::{transport::PortEnumerator, PortInfo, Result};

/// A port that passed the hardware-id filter and may be probed
pub type CandidatePort = PortInfo;

/// Ports whose hardware id equals `hardware_id` exactly, in enumeration order.
///
/// No matches is not an error; the handshake then has nothing to probe.
pub fn list_candidate_ports<E>(enumerator: &E, hardware_id: &str) -> Result<Vec<CandidatePort>>
where
    E: PortEnumerator + ?Sized,
{
    let candidates: Vec<CandidatePort> = enumerator
        .available_ports()?
        .into_iter()
        .filter(|port| port.hardware_id == hardware_id)
        .collect();

    let names: Vec<&str> = candidates.iter().map(|p| p.port_name.as_str()).collect();
    log::info!("Ports with hardware id {}: [{}]", hardware_id, names.join(", "));

    Ok(candidates)
}
