/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Kinematic wave routing of discharge.

use futures::try_join;

use crate::array::PartitionedArray;
use crate::array::spawn_partitions;
use crate::element::FloatElement;
use crate::error::Result;
use crate::policy::RoutingPolicies;
use crate::routing::router::Routers;
use crate::scalar::Operand;
use crate::scalar::template;

const MAX_NR_ITERATIONS: usize = 10;

/// The new discharge of a cell, solving
///
/// `(dt / dx) Q + alpha Q^beta = (dt / dx) Q_upstream + alpha Q_current^beta + dt q`
///
/// for `Q` with Newton-Raphson, where `q` is the lateral inflow. A
/// negative lateral inflow is an extraction of at most the discharge
/// computed without it.
pub(crate) fn new_discharge(
    upstream: f64,
    current: f64,
    lateral_inflow: f64,
    alpha: f64,
    beta: f64,
    time_step: f64,
    channel_length: f64,
) -> f64 {
    let mut discharge = 0.0;
    if upstream + current > 0.0 || lateral_inflow > 0.0 {
        let inflow = lateral_inflow.max(0.0);
        let dt_dx = time_step / channel_length;
        let alpha_beta = alpha * beta;
        let known = dt_dx * upstream + alpha * current.powf(beta) + time_step * inflow;
        let f = |q: f64| dt_dx * q + alpha * q.powf(beta) - known;
        let df = |q: f64| dt_dx + alpha_beta * q.powf(beta - 1.0);

        discharge = f64::MIN_POSITIVE;
        if upstream + current != 0.0 || beta >= 1.0 {
            let a_b_pq = alpha_beta * ((current + upstream) / 2.0).powf(beta - 1.0);
            discharge = ((dt_dx * upstream + a_b_pq * current + time_step * inflow) / (dt_dx + a_b_pq))
                .max(f64::MIN_POSITIVE);
        }

        // Roughly 60% of the mantissa bits.
        let tolerance = 2f64.powi(-((f64::MANTISSA_DIGITS as i32 * 3) / 5));
        for _ in 0..MAX_NR_ITERATIONS {
            let step = f(discharge) / df(discharge);
            let mut next = discharge - step;
            if next <= 0.0 {
                // The root is positive; halve towards zero instead.
                next = discharge / 2.0;
            }
            let converged = (next - discharge).abs() <= tolerance * next.abs();
            discharge = next;
            if converged {
                break;
            }
        }
    }
    if lateral_inflow < 0.0 {
        discharge -= (channel_length * lateral_inflow.abs()).min(discharge);
    }
    discharge
}

/// Route discharge downstream: the new discharge of every cell depends
/// on the new discharge of its upstream cells, its current discharge,
/// lateral inflow (negative for extraction) per unit channel length,
/// the channel parameters `alpha` and `beta`, the duration of the time
/// step and the channel length.
pub fn kinematic_wave<M: FloatElement>(
    flow_direction: &PartitionedArray<u8>,
    current_outflow: impl Into<Operand<M>>,
    inflow: impl Into<Operand<M>>,
    alpha: impl Into<Operand<M>>,
    beta: impl Into<Operand<M>>,
    time_step: impl Into<Operand<M>>,
    channel_length: impl Into<Operand<M>>,
) -> Result<PartitionedArray<M>> {
    let policies = RoutingPolicies::defensive().with_domain(|arguments: &[M]| {
        let zero = M::zero();
        let [current, _, alpha, beta, time_step, channel_length] = arguments else {
            return false;
        };
        *current >= zero && *alpha > zero && *beta > zero && *time_step > zero && *channel_length > zero
    });
    kinematic_wave_with(
        &policies,
        flow_direction,
        current_outflow,
        inflow,
        alpha,
        beta,
        time_step,
        channel_length,
    )
}

/// The domain predicate sees `[current_outflow, inflow, alpha, beta,
/// time_step, channel_length]`.
#[allow(clippy::too_many_arguments)]
pub fn kinematic_wave_with<M: FloatElement>(
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    current_outflow: impl Into<Operand<M>>,
    inflow: impl Into<Operand<M>>,
    alpha: impl Into<Operand<M>>,
    beta: impl Into<Operand<M>>,
    time_step: impl Into<Operand<M>>,
    channel_length: impl Into<Operand<M>>,
) -> Result<PartitionedArray<M>> {
    let operands: [Operand<M>; 6] = [
        current_outflow.into(),
        inflow.into(),
        alpha.into(),
        beta.into(),
        time_step.into(),
        channel_length.into(),
    ];
    let (runtime, tiling) = template(
        "kinematic_wave",
        std::iter::once(Some((flow_direction.runtime(), flow_direction.tiling())))
            .chain(operands.iter().map(|operand| operand.layout())),
    )?;
    let mut routers = Routers::<M>::new("kinematic_wave", flow_direction, policies.flow_direction)?;
    Ok(spawn_partitions(&runtime, &tiling, "kinematic_wave", |i| {
        let router = routers.router(i);
        let [current, inflow, alpha, beta, time_step, channel_length] =
            operands.each_ref().map(|operand| operand.values(i));
        let policies = policies.clone();
        async move {
            let (mut router, current, inflow, alpha, beta, time_step, channel_length) =
                try_join!(router, current, inflow, alpha, beta, time_step, channel_length)?;
            let parameters = [&current, &inflow, &alpha, &beta, &time_step, &channel_length];
            let mut discharge = vec![policies.output.no_data(); router.len()];
            router
                .propagate(|cell, upstream| {
                    let mut arguments = [M::zero(); 6];
                    for (argument, values) in arguments.iter_mut().zip(parameters) {
                        *argument = policies.material.valid(values.get(cell))?;
                    }
                    if !policies.domain.within_domain(&arguments) {
                        return None;
                    }
                    let [current, inflow, alpha, beta, time_step, channel_length] =
                        arguments.map(|argument| argument.into_f64());
                    let new = new_discharge(
                        upstream?.into_f64(),
                        current,
                        inflow,
                        alpha,
                        beta,
                        time_step,
                        channel_length,
                    );
                    let new = policies.output.checked(M::try_from_f64(new))?;
                    discharge[cell] = new;
                    Some(new)
                })
                .await?;
            router.partition(discharge)
        }
    }))
}
