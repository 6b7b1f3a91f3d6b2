/*!
Seeded sampling methods used to build initial designs, candidate pools and
Monte-Carlo estimates of the low-rank BOPE toolbox.

A design space is given as a 2D ndarray `(nx, 2)` holding the lower and upper
bound of each of the `nx` input components.

Example:
```
use lowrank_doe::{Lhs, LhsKind, Random, SamplingMethod};
use ndarray::arr2;

let xlimits = arr2(&[[5., 10.], [0., 1.]]);
// five samples from a maximin Latin hypercube, reproducible through the seed
let samples = Lhs::new(&xlimits).unwrap().seed(42).sample(5);
// or uniformly at random
let samples = Random::new(&xlimits).unwrap().seed(42).sample(5);
```

Two kinds of sampling are available:
* [Latin Hypercube Sampling](crate::lhs::Lhs),
* [Random Sampling](crate::random::Random)
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod errors;
mod lhs;
mod random;
mod traits;
mod utils;

pub use errors::*;
pub use lhs::*;
pub use random::*;
pub use traits::*;
