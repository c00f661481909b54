mod authorization;
mod confirmation;
mod turn;
