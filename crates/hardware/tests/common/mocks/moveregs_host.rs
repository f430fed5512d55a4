use mockall::mock;
use rmt_model::mau::moveregs::{MoveResource, MoveregsConfig};
use rmt_model::mau::moveregs_ctl::MoveregsHost;

mock! {
    pub MoveHost {}
    impl MoveregsHost for MoveHost {
        fn teop_busy(&self, lt: u8) -> bool;
        fn is_miss_address(&self, lt: u8, addr: u32) -> bool;
        fn moveregs_config(&self, lt: u8) -> MoveregsConfig;
        fn set_inhibit(&mut self, lt: u8, addr: u32, inhibit: bool);
        fn copy_resource(&mut self, lt: u8, res: MoveResource, from: u32, to: u32);
        fn zero_resource(&mut self, lt: u8, res: MoveResource, addr: u32);
        fn update_addresses(&mut self, lt: u8, d_addr: Option<u32>, old_d_addr: Option<u32>);
    }
}

/// One side effect the move controller asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostCall {
    Inhibit { addr: u32, on: bool },
    Copy { res: MoveResource, from: u32, to: u32 },
    Zero { res: MoveResource, addr: u32 },
    Update { d: Option<u32>, old_d: Option<u32> },
}

/// A host that never refuses and records every call in order.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub busy: bool,
    pub miss: Option<u32>,
    pub config: MoveregsConfig,
    pub calls: Vec<HostCall>,
}

impl RecordingHost {
    pub fn with_config(config: MoveregsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn take(&mut self) -> Vec<HostCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn updates(&self) -> Vec<(Option<u32>, Option<u32>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Update { d, old_d } => Some((*d, *old_d)),
                _ => None,
            })
            .collect()
    }
}

impl MoveregsHost for RecordingHost {
    fn teop_busy(&self, _lt: u8) -> bool {
        self.busy
    }

    fn is_miss_address(&self, _lt: u8, addr: u32) -> bool {
        self.miss == Some(addr)
    }

    fn moveregs_config(&self, _lt: u8) -> MoveregsConfig {
        self.config
    }

    fn set_inhibit(&mut self, _lt: u8, addr: u32, inhibit: bool) {
        self.calls.push(HostCall::Inhibit { addr, on: inhibit });
    }

    fn copy_resource(&mut self, _lt: u8, res: MoveResource, from: u32, to: u32) {
        self.calls.push(HostCall::Copy { res, from, to });
    }

    fn zero_resource(&mut self, _lt: u8, res: MoveResource, addr: u32) {
        self.calls.push(HostCall::Zero { res, addr });
    }

    fn update_addresses(&mut self, _lt: u8, d_addr: Option<u32>, old_d_addr: Option<u32>) {
        self.calls.push(HostCall::Update {
            d: d_addr,
            old_d: old_d_addr,
        });
    }
}
