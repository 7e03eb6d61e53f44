//! This bench compiles a role over a wide, layered registry in which every
//! profile contains several components from the layer below, so shared
//! components are reached (and merged) many times.

#![allow(missing_docs)]

use criterion::{Criterion, criterion_group, criterion_main};
use rolecheck::{
    ComponentDefinition, ComponentId, ComponentRef, ExpansionRule, ExpectationSet, Harness,
    Params, Registry, Role, compile, domain::registry::Sealed,
};

const LAYERS: usize = 5;
const WIDTH: usize = 40;
const FAN_OUT: usize = 4;

fn component(layer: usize, index: usize) -> ComponentId {
    format!("profile::layer{layer}::component{index}")
        .parse()
        .unwrap()
}

/// Builds a registry where each component in layer `n` includes `FAN_OUT`
/// components from layer `n + 1`.
fn layered_registry() -> Registry<Sealed> {
    let mut registry = Registry::new();
    for layer in 0..LAYERS {
        for index in 0..WIDTH {
            let children = if layer + 1 == LAYERS {
                ExpansionRule::Leaf
            } else {
                ExpansionRule::Static(
                    (0..FAN_OUT)
                        .map(|offset| {
                            ComponentRef::with_params(
                                component(layer + 1, (index + offset) % WIDTH),
                                Params::new().with("from", index as u64),
                            )
                        })
                        .collect(),
                )
            };
            registry
                .register(ComponentDefinition::new(
                    component(layer, index),
                    children,
                    Params::new().with("layer", layer as u64),
                ))
                .unwrap();
        }
    }
    registry.seal()
}

fn top_level_role() -> Role {
    (0..WIDTH).fold(Role::new("role::bench"), |role, index| {
        role.include(component(0, index))
    })
}

fn compile_layered(c: &mut Criterion) {
    let registry = layered_registry();
    let role = top_level_role();

    c.bench_function("compile layered role", |b| {
        b.iter(|| compile(&registry, &role).unwrap());
    });
}

fn check_layered(c: &mut Criterion) {
    let registry = layered_registry();
    let role = top_level_role();
    let expectations: ExpectationSet = (0..LAYERS)
        .flat_map(|layer| (0..WIDTH).map(move |index| component(layer, index)))
        .collect();

    c.bench_function("check layered role", |b| {
        b.iter(|| Harness::new(&registry).check(&role, &expectations).unwrap());
    });
}

criterion_group!(benches, compile_layered, check_layered);
criterion_main!(benches);
