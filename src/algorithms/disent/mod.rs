pub mod disent_learn;
