//! Test to verify test infrastructure works correctly

mod common;

use common::builders::{rig, AdcBuilder};
use iio_core::Direction;

#[test]
fn test_infrastructure_setup() {
    // Test that builders work
    let dev = AdcBuilder::new("iio:device3")
        .name("ad7768")
        .channel("voltage0", "be:S24/32>>8")
        .build();

    assert_eq!(dev.id, "iio:device3");
    assert_eq!(dev.channels[0].direction, Direction::Input);
    assert_eq!(dev.channels[0].attrs.len(), 2);

    let (ctx, _sim) = rig();
    assert_eq!(ctx.devices_count(), 4);
}
