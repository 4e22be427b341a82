//! Dependency ordering for a batch of services deployed together.

use std::collections::HashSet;

use keel_store::ServiceConfig;

/// Order services so that each one follows the in-batch services it depends on.
///
/// Dependencies naming services outside the batch are treated as already
/// satisfied. Each pass places every service whose in-batch dependencies are
/// placed, including ones placed earlier in the same pass. When a pass places
/// nothing the batch contains a cycle, and the remaining services are appended
/// in input order. The result is always a permutation of the input.
#[must_use]
pub fn order_by_dependencies(services: Vec<ServiceConfig>) -> Vec<ServiceConfig> {
    let total = services.len();
    if total <= 1 {
        return services;
    }

    let in_batch: HashSet<&str> = services.iter().map(|s| s.name.as_str()).collect();
    let mut placed_names: HashSet<&str> = HashSet::with_capacity(total);
    let mut placed = vec![false; total];
    let mut order = Vec::with_capacity(total);

    while order.len() < total {
        let mut progress = false;

        for (index, service) in services.iter().enumerate() {
            if placed[index] {
                continue;
            }

            let ready = service
                .depends_on
                .iter()
                .map(String::as_str)
                .filter(|dep| in_batch.contains(dep))
                .all(|dep| placed_names.contains(dep));

            if ready {
                placed[index] = true;
                placed_names.insert(service.name.as_str());
                order.push(index);
                progress = true;
            }
        }

        if !progress {
            let unresolved: Vec<&str> = services
                .iter()
                .zip(&placed)
                .filter(|(_, done)| !**done)
                .map(|(s, _)| s.name.as_str())
                .collect();
            tracing::warn!(
                services = ?unresolved,
                "Dependency cycle in deploy batch, deploying remaining services in declaration order"
            );
            order.extend((0..total).filter(|&index| !placed[index]));
            break;
        }
    }

    let mut slots: Vec<Option<ServiceConfig>> = services.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}
