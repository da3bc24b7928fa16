use serde::Serialize;

use super::central::Peripheral;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPeripheral {
    pub peripheral: Peripheral,
    pub rssi: i16,
}

/// Strongest signal first. Peripherals without a reading are left out
/// entirely; equal readings are ordered by identifier so the list is stable
/// between ticks.
pub fn rank_peripherals<'a, I>(discovered: I) -> Vec<RankedPeripheral>
where
    I: IntoIterator<Item = (&'a Peripheral, Option<i16>)>,
{
    let mut ranked: Vec<RankedPeripheral> = discovered
        .into_iter()
        .filter_map(|(peripheral, rssi)| {
            rssi.map(|rssi| RankedPeripheral {
                peripheral: peripheral.clone(),
                rssi,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.rssi
            .cmp(&a.rssi)
            .then_with(|| a.peripheral.identifier.cmp(&b.peripheral.identifier))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn peripheral(n: u128, name: &str) -> Peripheral {
        Peripheral {
            identifier: Uuid::from_u128(n),
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn peripherals_without_rssi_are_excluded() {
        let p1 = peripheral(1, "P1");
        let p2 = peripheral(2, "P2");
        let p3 = peripheral(3, "P3");

        let ranked = rank_peripherals([(&p3, Some(-70)), (&p2, None), (&p1, Some(-40))]);
        let names: Vec<_> = ranked
            .iter()
            .map(|r| r.peripheral.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["P1", "P3"]);
        assert_eq!(ranked[0].rssi, -40);
    }

    #[test]
    fn ties_are_ordered_by_identifier() {
        let a = peripheral(10, "a");
        let b = peripheral(20, "b");
        let ranked = rank_peripherals([(&b, Some(-55)), (&a, Some(-55))]);
        assert_eq!(ranked[0].peripheral, a);
        assert_eq!(ranked[1].peripheral, b);
    }

    #[test]
    fn nothing_discovered_ranks_empty() {
        assert!(rank_peripherals(std::iter::empty::<(&Peripheral, Option<i16>)>()).is_empty());
    }
}
