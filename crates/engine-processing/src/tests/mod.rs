mod mocks;

mod copy;
