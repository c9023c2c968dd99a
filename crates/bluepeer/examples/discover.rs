use bluepeer::{
    CharacteristicProperty, DiscoveryEvent, GattCharacteristic, GattDescriptor, GattDiscovery,
    GattService, HandleRange, PeerCache, PeerCacheConfig, PoolCapacities, SessionToken, Uuid,
    STATUS_SUCCESS,
};
use std::collections::VecDeque;

/// An in-memory device answering discovery requests from a fixed table
struct SimulatedDevice {
    services: Vec<GattService>,
    characteristics: Vec<GattCharacteristic>,
    descriptors: Vec<GattDescriptor>,
    queue: VecDeque<(SessionToken, Vec<DiscoveryEvent>)>,
}

impl SimulatedDevice {
    fn battery_and_heart_rate() -> Self {
        Self {
            services: vec![
                GattService::new(0x0001, 0x0004, 0x180Fu16),
                GattService::new(0x0005, 0x000A, 0x180Du16),
            ],
            characteristics: vec![
                GattCharacteristic::new(
                    0x0002,
                    0x0003,
                    CharacteristicProperty::READ | CharacteristicProperty::NOTIFY,
                    0x2A19u16,
                ),
                GattCharacteristic::new(0x0006, 0x0007, CharacteristicProperty::NOTIFY, 0x2A37u16),
                GattCharacteristic::new(0x0009, 0x000A, CharacteristicProperty::READ, 0x2A38u16),
            ],
            descriptors: vec![
                GattDescriptor::new(0x0004, 0x2902u16),
                GattDescriptor::new(0x0008, 0x2902u16),
            ],
            queue: VecDeque::new(),
        }
    }

    fn answer(&mut self, token: SessionToken, mut events: Vec<DiscoveryEvent>) -> Result<(), u16> {
        events.push(DiscoveryEvent::Complete(STATUS_SUCCESS));
        self.queue.push_back((token, events));
        Ok(())
    }
}

impl GattDiscovery for SimulatedDevice {
    fn discover_services(&mut self, token: SessionToken) -> Result<(), u16> {
        let events = self.services.iter().map(|s| DiscoveryEvent::Service(*s)).collect();
        self.answer(token, events)
    }

    fn discover_services_by_uuid(&mut self, uuid: &Uuid, token: SessionToken) -> Result<(), u16> {
        let events = self
            .services
            .iter()
            .filter(|s| s.uuid == *uuid)
            .map(|s| DiscoveryEvent::Service(*s))
            .collect();
        self.answer(token, events)
    }

    fn discover_included_services(
        &mut self,
        _range: HandleRange,
        token: SessionToken,
    ) -> Result<(), u16> {
        self.answer(token, Vec::new())
    }

    fn discover_characteristics(&mut self, range: HandleRange, token: SessionToken) -> Result<(), u16> {
        let events = self
            .characteristics
            .iter()
            .filter(|c| range.contains(c.declaration_handle))
            .map(|c| DiscoveryEvent::Characteristic(*c))
            .collect();
        self.answer(token, events)
    }

    fn discover_descriptors(&mut self, range: HandleRange, token: SessionToken) -> Result<(), u16> {
        let events = self
            .descriptors
            .iter()
            .filter(|d| range.contains(d.handle))
            .map(|d| DiscoveryEvent::Descriptor(*d))
            .collect();
        self.answer(token, events)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PeerCacheConfig::new(PoolCapacities::new(1, 4, 8, 8));
    let mut cache = PeerCache::new(config, SimulatedDevice::battery_and_heart_rate())?;

    let conn_handle = 0x0040;
    cache.add(conn_handle)?;
    cache.set_mtu(conn_handle, 247)?;

    println!("Discovering attributes on connection 0x{:04X}...", conn_handle);
    cache.discover_all(conn_handle, |peer, result| {
        println!("Discovery finished: {:?}", result);
        for svc in peer.services() {
            println!("Service {:?} {}", svc.uuid, svc.range());
            for chr in svc.characteristics() {
                println!(
                    "  Characteristic {:?} value 0x{:04X} ({:?})",
                    chr.uuid, chr.value_handle, chr.properties
                );
                for dsc in chr.descriptors() {
                    println!("    Descriptor {:?} at 0x{:04X}", dsc.uuid, dsc.handle);
                }
            }
        }
    })?;

    // Deliver queued answers until the session stops issuing requests
    while let Some((token, events)) = cache.discovery_mut().queue.pop_front() {
        for event in events {
            cache.handle_event(token, event);
        }
    }

    let peer = cache.find(conn_handle)?;
    if let Some(level) = peer.find_characteristic(&0x180Fu16.into(), &0x2A19u16.into()) {
        println!("Battery level is readable at handle 0x{:04X}", level.value_handle);
    }
    println!("Pool usage: {} records in use", cache.pool_usage().in_use());

    cache.delete(conn_handle)?;
    Ok(())
}
