//! NSGA-II style selection: fast non-dominated sorting plus crowding
//! distance, used both to trim the population at each generation boundary
//! and to rank parents for breeding.

use crate::patch::Individual;
use crate::score::Fitness;

/// Partitions individuals into Pareto fronts by index, front 0 being the
/// non-dominated set.
fn fast_non_dominated_sort(individuals: &[Individual]) -> Vec<Vec<usize>> {
  let n = individuals.len();
  let mut domination_count = vec![0usize; n];
  let mut dominates_list: Vec<Vec<usize>> = vec![Vec::new(); n];
  let mut fronts: Vec<Vec<usize>> = vec![Vec::new()];

  for i in 0..n {
    for j in 0..n {
      if i == j {
        continue;
      }
      if individuals[i].fitness().dominates(individuals[j].fitness()) {
        dominates_list[i].push(j);
      } else if individuals[j].fitness().dominates(individuals[i].fitness()) {
        domination_count[i] += 1;
      }
    }
    if domination_count[i] == 0 {
      fronts[0].push(i);
    }
  }

  let mut k = 0;
  while !fronts[k].is_empty() {
    let mut next_front = Vec::new();
    for &i in &fronts[k] {
      for &j in &dominates_list[i] {
        domination_count[j] -= 1;
        if domination_count[j] == 0 {
          next_front.push(j);
        }
      }
    }
    k += 1;
    fronts.push(next_front);
  }
  fronts.pop();
  fronts
}

/// Flattens a fitness into one comparable objective vector: hard values,
/// then soft values, then gas values in (sorted) key order.
fn objective_vector(fitness: &Fitness) -> Vec<f64> {
  let mut values: Vec<f64> = fitness.hard.iter().map(|x| *x as f64).collect();
  values.extend(fitness.soft.iter().map(|x| *x as f64));
  values.extend(fitness.gas.values().map(|x| *x as f64));
  values
}

/// Standard NSGA-II crowding distance within one front: for each objective,
/// boundary individuals get infinite distance, interior ones accumulate
/// normalized neighbor spread.
fn crowding_distance(individuals: &[Individual], front: &[usize]) -> Vec<f64> {
  let m = front.len();
  let mut distance = vec![0.0f64; m];
  if m <= 2 {
    return vec![f64::INFINITY; m];
  }

  let num_objectives = objective_vector(individuals[front[0]].fitness()).len();
  for obj in 0..num_objectives {
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| {
      let fa = objective_vector(individuals[front[a]].fitness())[obj];
      let fb = objective_vector(individuals[front[b]].fitness())[obj];
      fa.partial_cmp(&fb).unwrap()
    });
    distance[order[0]] = f64::INFINITY;
    distance[order[m - 1]] = f64::INFINITY;

    let min = objective_vector(individuals[front[order[0]]].fitness())[obj];
    let max = objective_vector(individuals[front[order[m - 1]]].fitness())[obj];
    let range = max - min;
    if range == 0.0 {
      continue;
    }
    for w in 1..m - 1 {
      let prev = objective_vector(individuals[front[order[w - 1]]].fitness())[obj];
      let next = objective_vector(individuals[front[order[w + 1]]].fitness())[obj];
      distance[order[w]] += (next - prev) / range;
    }
  }
  distance
}

/// The full goodness-ordered index list: front rank ascending, crowding
/// distance descending within a front.
fn ranked_indices(population: &[Individual]) -> Vec<usize> {
  let fronts = fast_non_dominated_sort(population);
  let mut ordered = Vec::with_capacity(population.len());
  for front in &fronts {
    let distances = crowding_distance(population, front);
    let mut within_front: Vec<usize> = (0..front.len()).collect();
    within_front.sort_by(|&a, &b| distances[b].partial_cmp(&distances[a]).unwrap());
    ordered.extend(within_front.into_iter().map(|i| front[i]));
  }
  ordered
}

/// The top `k` individuals by fitness rank, ties broken by crowding
/// distance, used to choose breeding parents.
pub fn select_best(population: &[Individual], k: usize) -> Vec<usize> {
  ranked_indices(population).into_iter().take(k).collect()
}

/// Trims `population` down to `max_population_size` by NSGA-II selection.
/// A no-op if the population is already within bounds (still useful to
/// call once at startup purely to assign crowding distance bookkeeping).
pub fn nsga2_select(population: Vec<Individual>, max_population_size: usize) -> Vec<Individual> {
  if population.len() <= max_population_size {
    return population;
  }
  let keep: Vec<usize> = ranked_indices(&population).into_iter().take(max_population_size).collect();
  let mut slots: Vec<Option<Individual>> = population.into_iter().map(Some).collect();
  keep.into_iter().map(|i| slots[i].take().expect("index selected at most once")).collect()
}
