/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::time::Instant;

use clap::Args;
use clap::Subcommand;
use gridflow::Config;
use gridflow::Kernel;
use gridflow::PartitionedArray;
use gridflow::Runtime;
use gridflow::focal;
use gridflow::global;
use gridflow::local;
use gridflow::route;
use gridflow::routing;
use gridflow::uniform;
use gridflow::zonal;
use gridslice::Shape;

#[derive(Subcommand, Debug)]
pub enum DemoCommand {
    /// Smooth random terrain, then derive its slope, flow direction and
    /// flow accumulation.
    Terrain(TerrainArgs),
    /// Rank the cells of random terrain by flow accumulation, and
    /// integrate elevation along the ranking within random zones.
    Route(RouteArgs),
}

#[derive(Args, Debug)]
pub struct TerrainArgs {
    /// The shape of the terrain, e.g. 1000x1000.
    #[arg(long, default_value = "512x512", value_parser = parse_shape)]
    shape: Shape,

    /// The partition shape. Defaults to the configured partition shape.
    #[arg(long, value_parser = parse_shape)]
    partition_shape: Option<Shape>,

    /// Seed of the random terrain.
    #[arg(long, default_value_t = 5)]
    seed: u64,

    /// Radius of the smoothing kernel.
    #[arg(long, default_value_t = 2)]
    radius: usize,

    /// Distance between cell centres, in elevation units.
    #[arg(long, default_value_t = 10.0)]
    cell_size: f64,
}

#[derive(Args, Debug)]
pub struct RouteArgs {
    #[command(flatten)]
    terrain: TerrainArgs,

    /// The number of zones.
    #[arg(long, default_value_t = 4)]
    nr_zones: u32,

    /// The number of cells to mark per zone.
    #[arg(long, default_value_t = 10)]
    n: usize,
}

impl DemoCommand {
    pub async fn run(self, config: &Config) -> anyhow::Result<()> {
        let runtime = Runtime::new(config)?;
        let start = Instant::now();
        match self {
            DemoCommand::Terrain(args) => terrain(&runtime, config, &args).await?,
            DemoCommand::Route(args) => route(&runtime, config, &args).await?,
        }
        println!("finished in {:.2?}", start.elapsed());
        Ok(())
    }
}

impl TerrainArgs {
    fn partition_shape(&self, config: &Config) -> Shape {
        self.partition_shape
            .clone()
            .unwrap_or_else(|| config.partition_shape_for(self.shape.rank()))
    }
}

/// Smoothed random elevation.
fn elevation(runtime: &Runtime, config: &Config, args: &TerrainArgs) -> anyhow::Result<PartitionedArray<f64>> {
    let noise = uniform(
        runtime,
        args.shape.clone(),
        args.partition_shape(config),
        0.0f64,
        100.0,
        args.seed,
    )?;
    let kernel = Kernel::box_kernel(args.radius, 1.0);
    Ok(focal::focal_mean(&noise, &kernel)?)
}

async fn terrain(runtime: &Runtime, config: &Config, args: &TerrainArgs) -> anyhow::Result<()> {
    let elevation = elevation(runtime, config, args)?;
    let slope = focal::slope(&elevation, args.cell_size)?;
    let flow_direction = focal::d8_flow_direction(&elevation)?;
    let accumulation = routing::accu(&flow_direction, 1.0f64)?;
    let sinks = local::equal_to(&flow_direction, 5u8)?;
    tracing::info!(
        shape = %args.shape,
        nr_partitions = elevation.nr_partitions(),
        "scheduled terrain pipeline"
    );

    println!("shape:               {}", args.shape);
    println!("partitions:          {}", elevation.nr_partitions());
    println!(
        "elevation:           {:.3} .. {:.3}",
        global::minimum(&elevation).await?,
        global::maximum(&elevation).await?
    );
    println!("maximum slope:       {:.3}", global::maximum(&slope).await?);
    println!("sinks:               {}", global::sum(&local::cast::<u8, u64>(&sinks)).await?);
    println!("largest catchment:   {} cells", global::maximum(&accumulation).await?);
    Ok(())
}

async fn route(runtime: &Runtime, config: &Config, args: &RouteArgs) -> anyhow::Result<()> {
    let elevation = elevation(runtime, config, &args.terrain)?;
    let flow_direction = focal::d8_flow_direction(&elevation)?;
    let accumulation = routing::accu(&flow_direction, 1.0f64)?;
    let zones = uniform(
        runtime,
        args.terrain.shape.clone(),
        args.terrain.partition_shape(config),
        1u32,
        args.nr_zones.max(1),
        args.terrain.seed + 1,
    )?;

    let marked = route::highest_n_zones(&zones, &accumulation, args.n)?;
    let ranking = route::decreasing_order_zones(&zones, &accumulation, args.n)?;
    let integral = route::integrate(&ranking, &elevation, args.n)?;
    let area = zonal::zonal_area(&zones)?;

    println!("zones:               {}", args.nr_zones);
    println!("routes:              {}", ranking.route_ids().await?.len());
    println!("marked cells:        {}", global::count_valid(&marked).await?);
    println!("integrated cells:    {}", global::count_valid(&integral).await?);
    println!("largest zone:        {} cells", global::maximum(&area).await?);
    println!("maximum integral:    {:.3}", global::maximum(&integral).await?);
    Ok(())
}

/// Parses a shape written as `500x500`.
fn parse_shape(value: &str) -> Result<Shape, String> {
    value
        .split(['x', 'X', ','])
        .map(|extent| {
            extent
                .trim()
                .parse::<usize>()
                .map_err(|err| format!("invalid extent {:?}: {}", extent, err))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Shape::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shape() {
        assert_eq!(parse_shape("30x20").unwrap(), Shape::from(vec![30, 20]));
        assert_eq!(parse_shape("7").unwrap(), Shape::from(vec![7]));
        assert!(parse_shape("3xa").is_err());
    }
}
